//! Environment-based configuration
//!
//! The server fails loudly at startup on unparseable values rather than
//! running with silent defaults.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Server configuration, read once at startup
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (`SURF_BIND`)
    pub bind: SocketAddr,
    /// Model identifier (`SURF_MODEL`)
    pub model: String,
    /// Explicit model API key (`ANTHROPIC_API_KEY`); absent lets the
    /// provider library do its own env lookup
    pub api_key: Option<String>,
    /// Mesh MCP server URL (`MESH_MCP_URL`)
    pub mesh_url: String,
    /// Optional Mesh bearer secret (`MESH_API_KEY`); absence omits the
    /// auth header entirely
    pub mesh_api_key: Option<String>,
    /// Tool catalog TTL (`SURF_TOOL_TTL_SECS`)
    pub tool_ttl: Duration,
    /// Per-result token budget for tool outputs (`SURF_TOOL_MAX_TOKENS`)
    pub tool_max_tokens: usize,
    /// Bound on tool rounds per request (`SURF_MAX_STEPS`)
    pub max_steps: usize,
    /// Sampling temperature (`SURF_TEMPERATURE`)
    pub temperature: f32,
    /// Output-length limit per model invocation (`SURF_MAX_OUTPUT_TOKENS`)
    pub max_output_tokens: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind: parse_env("SURF_BIND", SocketAddr::from(([0, 0, 0, 0], 3030)))?,
            model: env_or("SURF_MODEL", "anthropic/claude-3-5-sonnet-20241022"),
            api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            mesh_url: env_or("MESH_MCP_URL", "https://sequencer-v2.heurist.xyz/mcp"),
            mesh_api_key: std::env::var("MESH_API_KEY").ok(),
            tool_ttl: Duration::from_secs(parse_env("SURF_TOOL_TTL_SECS", 300u64)?),
            tool_max_tokens: parse_env("SURF_TOOL_MAX_TOKENS", 8000usize)?,
            max_steps: parse_env("SURF_MAX_STEPS", 5usize)?,
            temperature: parse_env("SURF_TEMPERATURE", 0.7f32)?,
            max_output_tokens: parse_env("SURF_MAX_OUTPUT_TOKENS", 4096u32)?,
        })
    }
}

fn env_or(key: &'static str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

//! Provider trait definition

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::types::{CancellationToken, ChatMessage, StreamChunk, Tool};

use super::error::ProviderResult;

/// Options for a single streamed model invocation
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Model identifier, optionally provider-prefixed (e.g. "anthropic/claude-3-5-sonnet-20241022")
    pub model: String,
    /// Explicit API key; `None` lets the provider fall back to its env lookup
    pub api_key: Option<String>,
    /// Temperature for response generation
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Tools available for the model to use
    pub tools: Vec<Tool>,
}

impl ChatOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }
}

/// Type alias for the streaming response
pub type StreamResponse = Pin<Box<dyn Stream<Item = ProviderResult<StreamChunk>> + Send>>;

/// Provider trait for hosted LLM implementations
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name (e.g. "genai", "mock")
    fn name(&self) -> &str;

    /// Stream a chat completion. One invocation; the engine drives the
    /// tool-call loop across invocations.
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        options: &ChatOptions,
        cancel: CancellationToken,
    ) -> ProviderResult<StreamResponse>;
}

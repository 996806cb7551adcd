//! Tool client cache
//!
//! Owns the single Mesh connection for the process. Discovered tools are
//! cached for a fixed TTL and filtered against a static allow-list; every
//! tool output passes through the response filter before it is returned.
//!
//! Tool access is strictly best-effort: connection or catalog failures leave
//! the cache empty and the caller proceeds without tools. Concurrent requests
//! may race to refresh a stale cache; last writer wins, which is fine because
//! the cache is a performance optimization, never a correctness dependency.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Mutex;

use crate::filter::ResponseFilter;

use super::client::{MeshConnector, MeshError, MeshResult, MeshTransport, ToolDescriptor};

/// How long a discovered tool catalog stays fresh
pub const DEFAULT_TOOL_TTL: Duration = Duration::from_secs(300);

/// The fixed set of Mesh tools the engine is permitted to expose to the
/// model. Catalog entries outside this set are dropped silently.
pub const ALLOWED_TOOLS: &[&str] = &[
    "coingeckotokeninfoagent_get_token_price_multi",
    "coingeckotokeninfoagent_get_token_info",
    "coingeckotokeninfoagent_get_trending_coins",
    "exasearchagent_exa_web_search",
    "exasearchagent_exa_answer_question",
    "twitterinfoagent_get_general_search",
];

/// Monotonic clock dependency, injectable so tests can drive TTL expiry
/// without real delays.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by `Instant`
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct CacheEntry {
    transport: Arc<dyn MeshTransport>,
    tools: HashMap<String, ToolDescriptor>,
    expires_at: Instant,
}

/// Process-wide cache of the Mesh connection and its allow-listed tool set
pub struct ToolCache {
    connector: Arc<dyn MeshConnector>,
    filter: ResponseFilter,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    state: Mutex<Option<CacheEntry>>,
}

impl ToolCache {
    pub fn new(connector: Arc<dyn MeshConnector>, filter: ResponseFilter, ttl: Duration) -> Self {
        Self::with_clock(connector, filter, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(
        connector: Arc<dyn MeshConnector>,
        filter: ResponseFilter,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            connector,
            filter,
            clock,
            ttl,
            state: Mutex::new(None),
        }
    }

    /// Get the allow-listed tool mapping, refreshing the connection when the
    /// cache is stale or empty. Never fails: any connection or catalog error
    /// degrades to an empty mapping.
    pub async fn get_tools(&self) -> HashMap<String, ToolDescriptor> {
        let mut state = self.state.lock().await;

        if let Some(entry) = state.as_ref() {
            if self.clock.now() < entry.expires_at && !entry.tools.is_empty() {
                return entry.tools.clone();
            }
        }

        // Stale or empty: tear down any existing connection first. At most
        // one live connection exists per process.
        if let Some(entry) = state.take() {
            if let Err(e) = entry.transport.close().await {
                tracing::warn!(error = %e, "closing stale mesh connection failed");
            }
        }

        let transport = match self.connector.connect().await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "mesh connection failed, continuing without tools");
                return HashMap::new();
            }
        };

        let catalog = match transport.list_tools().await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "mesh tool listing failed, continuing without tools");
                if let Err(e) = transport.close().await {
                    tracing::debug!(error = %e, "closing failed mesh connection");
                }
                return HashMap::new();
            }
        };

        let discovered = catalog.len();
        let tools: HashMap<String, ToolDescriptor> = catalog
            .into_iter()
            .filter(|t| ALLOWED_TOOLS.contains(&t.name.as_str()))
            .map(|t| (t.name.clone(), t))
            .collect();

        tracing::info!(
            discovered,
            exposed = tools.len(),
            ttl_secs = self.ttl.as_secs(),
            "refreshed mesh tool catalog"
        );

        *state = Some(CacheEntry {
            transport,
            tools: tools.clone(),
            expires_at: self.clock.now() + self.ttl,
        });

        tools
    }

    /// Invoke an allow-listed tool and filter its output down to the token
    /// budget before it re-enters the model context.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> MeshResult<Value> {
        // Clone the transport out of the lock so tool calls don't serialize
        // behind each other or behind a refresh.
        let transport = {
            let state = self.state.lock().await;
            state
                .as_ref()
                .filter(|entry| entry.tools.contains_key(name))
                .map(|entry| Arc::clone(&entry.transport))
        };

        let transport = transport
            .ok_or_else(|| MeshError::ToolCallFailed(format!("unknown tool: {name}")))?;

        let raw = transport.call_tool(name, arguments).await?;
        Ok(self.filter.filter(raw))
    }

    /// Drop the cached entry and close its connection (best-effort)
    pub async fn invalidate(&self) {
        let entry = self.state.lock().await.take();
        if let Some(entry) = entry {
            if let Err(e) = entry.transport.close().await {
                tracing::warn!(error = %e, "closing mesh connection failed");
            }
        }
    }
}

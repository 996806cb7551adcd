//! Surf Core
//!
//! Transport-agnostic engine for the Surf crypto research assistant:
//! conversation types, a streaming LLM provider abstraction, a Mesh (MCP)
//! tool client with a TTL'd allow-listed cache, a tool response filter, and
//! the chat engine that ties them together.
//!
//! ```rust,ignore
//! use surf_core::{ChatEngine, EngineConfig, GenaiProvider, HttpMeshConnector,
//!                 ResponseFilter, ToolCache, DEFAULT_TOOL_TTL};
//!
//! let connector = Arc::new(HttpMeshConnector::new(mesh_url, mesh_api_key));
//! let tools = Arc::new(ToolCache::new(connector, ResponseFilter::default(), DEFAULT_TOOL_TTL));
//! let engine = ChatEngine::new(Arc::new(GenaiProvider::new()), tools, EngineConfig::default());
//!
//! let events = engine.stream_chat(conversation, cancel).await?;
//! ```

pub mod engine;
pub mod filter;
pub mod mesh;
pub mod providers;
pub mod types;

// Re-export commonly used types
pub use engine::{
    ChatEngine, ChatEvent, EngineConfig, EngineError, EventStream, RETRY_AFTER_SECS,
    SYSTEM_PROMPT,
};
pub use filter::ResponseFilter;
pub use mesh::{
    HttpMeshConnector, MeshClient, MeshConnector, MeshError, MeshTransport, ToolCache,
    ToolDescriptor, ALLOWED_TOOLS, DEFAULT_TOOL_TTL,
};
pub use providers::{ChatOptions, GenaiProvider, MockProvider, Provider, ProviderError};
pub use types::{
    CancellationToken, ChatMessage, ContentPart, MessageContent, MessageRole, StopReason,
    StreamChunk, Tool, ToolCall,
};

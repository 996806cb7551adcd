//! Core data types shared across the engine

mod cancellation;
mod message;
mod stream;
mod tool;

pub use cancellation::CancellationToken;
pub use message::{ChatMessage, ContentPart, MessageContent, MessageRole};
pub use stream::{StopReason, StreamChunk};
pub use tool::{Tool, ToolCall};

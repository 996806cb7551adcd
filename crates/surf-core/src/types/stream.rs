//! Provider-level streaming response types

use serde::{Deserialize, Serialize};

use super::tool::ToolCall;

/// Why a model run stopped producing output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model finished its answer normally
    EndTurn,
    /// The model hit its output-length limit
    MaxTokens,
    /// The engine's tool-step bound was reached with tool calls still pending
    StepLimit,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::EndTurn => write!(f, "end_turn"),
            StopReason::MaxTokens => write!(f, "max_tokens"),
            StopReason::StepLimit => write!(f, "step_limit"),
        }
    }
}

/// Streaming chunk from a single model invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Text content delta
    Text { text: String },
    /// Complete tool call captured from the model
    ToolCall {
        #[serde(rename = "toolCall")]
        tool_call: ToolCall,
    },
    /// End of one model invocation. Carries captured usage so the engine can
    /// detect output-length stops.
    End {
        #[serde(rename = "completionTokens", skip_serializing_if = "Option::is_none")]
        completion_tokens: Option<u32>,
    },
}

impl StreamChunk {
    pub fn text(text: impl Into<String>) -> Self {
        StreamChunk::Text { text: text.into() }
    }

    pub fn tool_call(tool_call: ToolCall) -> Self {
        StreamChunk::ToolCall { tool_call }
    }

    pub fn end(completion_tokens: Option<u32>) -> Self {
        StreamChunk::End { completion_tokens }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            StreamChunk::Text { text } => Some(text),
            _ => None,
        }
    }
}

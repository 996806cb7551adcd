//! Adapter between surf-core types and genai types
//!
//! Conversion functions in both directions, so the engine can lean on genai's
//! streaming and provider handling while keeping its own message model.
//! Assistant tool-use parts become genai tool-call messages and tool-result
//! parts become genai `ToolResponse` messages, which is what providers expect
//! for multi-step tool loops.

use genai::chat::{
    ChatMessage as GenaiMessage, ChatOptions as GenaiOptions, ChatStreamEvent,
    Tool as GenaiTool, ToolCall as GenaiToolCall, ToolResponse as GenaiToolResponse,
};
use genai::resolver::{AuthData, AuthResolver};
use genai::{Client, ModelIden};

use crate::types::{ChatMessage, ContentPart, MessageContent, MessageRole, StreamChunk, Tool, ToolCall};

use super::error::ProviderError;
use super::traits::ChatOptions;

/// Convert surf messages to genai messages.
///
/// Structured parts may expand to several genai messages: tool results are
/// standalone `ToolResponse` messages and a batch of tool-use parts becomes
/// one assistant tool-call message.
pub fn to_genai_messages(messages: Vec<ChatMessage>) -> Vec<GenaiMessage> {
    let mut out = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.content {
            MessageContent::Text(text) => out.push(text_message(msg.role, text)),
            MessageContent::Parts(parts) => {
                let mut text = String::new();
                let mut tool_calls: Vec<GenaiToolCall> = Vec::new();

                for part in parts {
                    match part {
                        ContentPart::Text { text: t } => {
                            if !text.is_empty() {
                                text.push('\n');
                            }
                            text.push_str(&t);
                        }
                        ContentPart::ToolUse { id, name, input } => {
                            tool_calls.push(GenaiToolCall {
                                call_id: id,
                                fn_name: name,
                                fn_arguments: input,
                                thought_signatures: None,
                            });
                        }
                        ContentPart::ToolResult {
                            tool_use_id,
                            content,
                        } => {
                            out.push(GenaiMessage::from(GenaiToolResponse::new(
                                tool_use_id,
                                content,
                            )));
                        }
                    }
                }

                if !text.is_empty() {
                    out.push(text_message(msg.role, text));
                }
                if !tool_calls.is_empty() {
                    out.push(GenaiMessage::from(tool_calls));
                }
            }
        }
    }

    out
}

fn text_message(role: MessageRole, text: String) -> GenaiMessage {
    match role {
        MessageRole::System => GenaiMessage::system(text),
        MessageRole::User => GenaiMessage::user(text),
        MessageRole::Assistant => GenaiMessage::assistant(text),
    }
}

/// Convert a surf tool definition to a genai tool
pub fn to_genai_tool(tool: Tool) -> GenaiTool {
    let mut genai_tool = GenaiTool::new(&tool.name).with_description(&tool.description);

    if let Some(schema) = tool.input_schema {
        genai_tool = genai_tool.with_schema(schema);
    }

    genai_tool
}

pub fn to_genai_tools(tools: Vec<Tool>) -> Vec<GenaiTool> {
    tools.into_iter().map(to_genai_tool).collect()
}

/// Convert engine options to genai options
pub fn to_genai_options(options: &ChatOptions) -> GenaiOptions {
    let mut genai_opts = GenaiOptions::default();

    if let Some(temp) = options.temperature {
        genai_opts = genai_opts.with_temperature(temp as f64);
    }

    if let Some(max_tokens) = options.max_tokens {
        genai_opts = genai_opts.with_max_tokens(max_tokens);
    }

    // Capture tool calls and usage so the end-of-stream event carries them
    genai_opts = genai_opts.with_capture_tool_calls(true);
    genai_opts = genai_opts.with_capture_usage(true);

    genai_opts
}

/// Convert genai ToolCall to surf ToolCall
pub fn from_genai_tool_call(tc: &GenaiToolCall) -> ToolCall {
    ToolCall {
        id: tc.call_id.clone(),
        name: tc.fn_name.clone(),
        input: tc.fn_arguments.clone(),
    }
}

/// Convert one genai stream event into zero or more stream chunks.
///
/// The End event expands to every captured tool call followed by an `End`
/// chunk carrying the completion token count.
pub fn from_genai_event(event: ChatStreamEvent) -> Vec<Result<StreamChunk, ProviderError>> {
    match event {
        ChatStreamEvent::Chunk(chunk) => vec![Ok(StreamChunk::Text {
            text: chunk.content,
        })],
        ChatStreamEvent::End(end) => {
            let mut out = Vec::new();
            if let Some(tool_calls) = end.captured_tool_calls() {
                for tc in tool_calls.iter() {
                    out.push(Ok(StreamChunk::tool_call(from_genai_tool_call(tc))));
                }
            }
            let completion_tokens = end
                .captured_usage
                .as_ref()
                .and_then(|u| u.completion_tokens)
                .map(|v| v as u32);
            out.push(Ok(StreamChunk::end(completion_tokens)));
            out
        }
        // Tool-call argument deltas are not forwarded; the captured calls at
        // End are authoritative.
        ChatStreamEvent::ToolCallChunk(_) => vec![],
        ChatStreamEvent::Start => vec![],
        ChatStreamEvent::ReasoningChunk(_) => vec![],
        ChatStreamEvent::ThoughtSignatureChunk(_) => vec![],
    }
}

/// Create a genai client. An explicit API key overrides genai's default
/// env-var lookup via a custom auth resolver.
pub fn create_client(api_key: Option<String>) -> Client {
    match api_key {
        Some(key) => {
            let auth_resolver = AuthResolver::from_resolver_fn(
                move |_model_iden: ModelIden| -> genai::resolver::Result<Option<AuthData>> {
                    Ok(Some(AuthData::from_single(key.clone())))
                },
            );
            Client::builder().with_auth_resolver(auth_resolver).build()
        }
        None => Client::default(),
    }
}

/// Extract the model name from a provider-prefixed model string
/// (e.g. "anthropic/claude-3-5-sonnet-20241022" -> "claude-3-5-sonnet-20241022")
pub fn extract_model_name(model: &str) -> &str {
    model.split('/').nth(1).unwrap_or(model)
}

//! Chat engine: the transport-agnostic request handler
//!
//! Accepts a conversation, resolves tools from the cache (best-effort),
//! invokes the hosted model, and streams text deltas and tool events to the
//! caller. The model may interleave up to `max_steps` rounds of tool
//! invocations with its own output before the engine stops executing tools.
//!
//! Request lifecycle: Received -> ToolsResolved -> ModelInvoked -> Streaming
//! -> Completed | Failed. There are no request-level retries; the caller
//! re-issues the conversation to retry.

mod prompt;

use std::pin::Pin;
use std::sync::Arc;

use futures::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::mesh::ToolCache;
use crate::providers::{ChatOptions, Provider, ProviderError, StreamResponse};
use crate::types::{
    CancellationToken, ChatMessage, ContentPart, MessageRole, StopReason, StreamChunk, Tool,
    ToolCall,
};

pub use prompt::SYSTEM_PROMPT;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Model identifier, optionally provider-prefixed
    pub model: String,
    /// Explicit API key; `None` falls back to the provider's env lookup
    pub api_key: Option<String>,
    pub temperature: f32,
    /// Output-length limit per model invocation
    pub max_tokens: u32,
    /// Bound on tool-invocation rounds per request
    pub max_steps: usize,
    pub system_prompt: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: "anthropic/claude-3-5-sonnet-20241022".to_string(),
            api_key: None,
            temperature: 0.7,
            max_tokens: 4096,
            max_steps: 5,
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Wire events streamed back to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Text delta from the model
    Text { text: String },
    /// The model invoked a tool
    ToolCall { id: String, name: String },
    /// A tool invocation completed (output already filtered)
    ToolResult {
        id: String,
        name: String,
        output: Value,
    },
    /// Final metrics for the request
    Finish {
        #[serde(rename = "stopReason")]
        stop_reason: StopReason,
        #[serde(rename = "textChars")]
        text_chars: usize,
        #[serde(rename = "toolCalls")]
        tool_calls: usize,
    },
    /// The stream failed mid-flight
    Error { message: String },
}

impl ChatEvent {
    /// Event name used on the wire (SSE event field)
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::Text { .. } => "text",
            ChatEvent::ToolCall { .. } => "tool_call",
            ChatEvent::ToolResult { .. } => "tool_result",
            ChatEvent::Finish { .. } => "finish",
            ChatEvent::Error { .. } => "error",
        }
    }
}

/// Request-level failures surfaced before streaming begins
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("conversation must contain at least one message")]
    EmptyConversation,

    #[error("upstream rate limited, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("conversation exceeds the model context window")]
    ContextTooLarge,

    #[error("model invocation failed: {0}")]
    Internal(String),
}

/// Fixed backoff suggestion surfaced with rate-limit failures
pub const RETRY_AFTER_SECS: u64 = 60;

impl From<ProviderError> for EngineError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::RateLimited { .. } => EngineError::RateLimited {
                retry_after_secs: RETRY_AFTER_SECS,
            },
            ProviderError::ContextTooLarge { .. } => EngineError::ContextTooLarge,
            other => EngineError::Internal(other.to_string()),
        }
    }
}

impl EngineError {
    /// User-facing message; never leaks internals
    pub fn public_message(&self) -> String {
        match self {
            EngineError::EmptyConversation => {
                "Request must contain at least one message".to_string()
            }
            EngineError::RateLimited { retry_after_secs } => format!(
                "Rate limited by the model provider. Please retry in about {retry_after_secs} seconds."
            ),
            EngineError::ContextTooLarge => {
                "The conversation is too large for the model. Try asking a narrower question."
                    .to_string()
            }
            EngineError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

/// Stream of wire events for one request
pub type EventStream = Pin<Box<dyn Stream<Item = ChatEvent> + Send>>;

/// The chat engine
pub struct ChatEngine {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolCache>,
    config: EngineConfig,
}

impl ChatEngine {
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolCache>, config: EngineConfig) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    /// Handle one conversation: resolve tools, invoke the model, and stream
    /// events back. Failures before the first model chunk surface as typed
    /// errors so the transport can map them to statuses; later failures
    /// arrive in-stream as `ChatEvent::Error`.
    pub async fn stream_chat(
        &self,
        conversation: Vec<ChatMessage>,
        cancel: CancellationToken,
    ) -> Result<EventStream, EngineError> {
        if conversation.is_empty() {
            return Err(EngineError::EmptyConversation);
        }

        // Best-effort: an empty mapping means the model answers unassisted
        let catalog = self.tools.get_tools().await;
        let tool_defs: Vec<Tool> = catalog
            .values()
            .map(|t| {
                Tool::new(&t.name, &t.description).with_schema(t.input_schema.clone())
            })
            .collect();

        tracing::debug!(tools = tool_defs.len(), turns = conversation.len(), "tools resolved");

        let options = ChatOptions {
            model: self.config.model.clone(),
            api_key: self.config.api_key.clone(),
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
            tools: tool_defs,
        };

        let mut messages = Vec::with_capacity(conversation.len() + 1);
        messages.push(ChatMessage::system(&self.config.system_prompt));
        messages.extend(conversation);

        let first = self
            .provider
            .stream_chat(messages.clone(), &options, cancel.clone())
            .await
            .map_err(EngineError::from)?;

        let (tx, rx) = mpsc::channel::<ChatEvent>(32);
        let turn = Turn {
            provider: Arc::clone(&self.provider),
            tools: Arc::clone(&self.tools),
            options,
            messages,
            max_steps: self.config.max_steps,
            max_tokens: self.config.max_tokens,
            cancel,
            tx,
        };
        tokio::spawn(turn.run(first));

        let stream =
            stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|ev| (ev, rx)) });
        Ok(Box::pin(stream))
    }
}

/// Driver for one request's model/tool loop
struct Turn {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolCache>,
    options: ChatOptions,
    messages: Vec<ChatMessage>,
    max_steps: usize,
    max_tokens: u32,
    cancel: CancellationToken,
    tx: mpsc::Sender<ChatEvent>,
}

impl Turn {
    async fn run(mut self, first: StreamResponse) {
        let mut stream = first;
        let mut text_chars = 0usize;
        let mut tool_calls_total = 0usize;
        let mut rounds = 0usize;
        let stop_reason;

        loop {
            let mut step_text = String::new();
            let mut captured: Vec<ToolCall> = Vec::new();
            let mut completion_tokens: Option<u32> = None;

            while let Some(item) = stream.next().await {
                if self.cancel.is_cancelled() {
                    tracing::debug!("client disconnected, dropping model stream");
                    return;
                }
                match item {
                    Ok(StreamChunk::Text { text }) => {
                        text_chars += text.chars().count();
                        step_text.push_str(&text);
                        if self.tx.send(ChatEvent::Text { text }).await.is_err() {
                            return;
                        }
                    }
                    Ok(StreamChunk::ToolCall { tool_call }) => captured.push(tool_call),
                    Ok(StreamChunk::End { completion_tokens: ct }) => completion_tokens = ct,
                    Err(ProviderError::Cancelled) => {
                        tracing::debug!("model stream cancelled");
                        return;
                    }
                    Err(e) => {
                        let err = EngineError::from(e);
                        tracing::warn!(error = %err, "model stream failed");
                        let _ = self
                            .tx
                            .send(ChatEvent::Error {
                                message: err.public_message(),
                            })
                            .await;
                        return;
                    }
                }
            }

            if captured.is_empty() {
                stop_reason = if completion_tokens.is_some_and(|ct| ct >= self.max_tokens) {
                    StopReason::MaxTokens
                } else {
                    StopReason::EndTurn
                };
                break;
            }

            if rounds >= self.max_steps {
                tracing::warn!(
                    max_steps = self.max_steps,
                    pending = captured.len(),
                    "tool step bound reached, finishing without executing"
                );
                stop_reason = StopReason::StepLimit;
                break;
            }
            rounds += 1;

            // Record the assistant turn (text + tool-use parts) before the
            // tool results so the next invocation sees a coherent history.
            let mut parts = Vec::with_capacity(captured.len() + 1);
            if !step_text.is_empty() {
                parts.push(ContentPart::text(step_text.clone()));
            }
            for tc in &captured {
                parts.push(ContentPart::tool_use(
                    tc.id.clone(),
                    tc.name.clone(),
                    tc.input.clone(),
                ));
            }
            self.messages
                .push(ChatMessage::with_parts(MessageRole::Assistant, parts));

            for tc in captured {
                tool_calls_total += 1;
                if self
                    .tx
                    .send(ChatEvent::ToolCall {
                        id: tc.id.clone(),
                        name: tc.name.clone(),
                    })
                    .await
                    .is_err()
                {
                    return;
                }

                let output = match self.tools.call_tool(&tc.name, tc.input.clone()).await {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(tool = %tc.name, error = %e, "tool invocation failed");
                        json!({ "error": e.to_string() })
                    }
                };

                // A call that was in flight when the client left is allowed
                // to complete; its result is discarded here.
                if self.cancel.is_cancelled() {
                    return;
                }

                if self
                    .tx
                    .send(ChatEvent::ToolResult {
                        id: tc.id.clone(),
                        name: tc.name.clone(),
                        output: output.clone(),
                    })
                    .await
                    .is_err()
                {
                    return;
                }

                self.messages.push(ChatMessage::with_parts(
                    MessageRole::User,
                    vec![ContentPart::tool_result(tc.id, output.to_string())],
                ));
            }

            stream = match self
                .provider
                .stream_chat(self.messages.clone(), &self.options, self.cancel.clone())
                .await
            {
                Ok(s) => s,
                Err(e) => {
                    let err = EngineError::from(e);
                    tracing::warn!(error = %err, round = rounds, "model re-invocation failed");
                    let _ = self
                        .tx
                        .send(ChatEvent::Error {
                            message: err.public_message(),
                        })
                        .await;
                    return;
                }
            };
        }

        if stop_reason == StopReason::MaxTokens {
            tracing::warn!("model stopped at its output-length limit");
        }
        tracing::info!(
            text_chars,
            tool_calls = tool_calls_total,
            stop_reason = %stop_reason,
            "chat turn finished"
        );

        let _ = self
            .tx
            .send(ChatEvent::Finish {
                stop_reason,
                text_chars,
                tool_calls: tool_calls_total,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::time::Duration;

    use crate::filter::ResponseFilter;
    use crate::mesh::{
        MeshConnector, MeshError, MeshResult, MeshTransport, ToolCache, ToolDescriptor,
        DEFAULT_TOOL_TTL,
    };
    use crate::providers::MockProvider;

    const PRICE_TOOL: &str = "coingeckotokeninfoagent_get_token_price_multi";

    struct StaticTransport {
        catalog: Vec<ToolDescriptor>,
        output: Value,
    }

    #[async_trait]
    impl MeshTransport for StaticTransport {
        async fn list_tools(&self) -> MeshResult<Vec<ToolDescriptor>> {
            Ok(self.catalog.clone())
        }
        async fn call_tool(&self, _name: &str, _arguments: Value) -> MeshResult<Value> {
            Ok(self.output.clone())
        }
        async fn close(&self) -> MeshResult<()> {
            Ok(())
        }
    }

    struct StaticConnector {
        catalog: Vec<ToolDescriptor>,
        output: Value,
    }

    #[async_trait]
    impl MeshConnector for StaticConnector {
        async fn connect(&self) -> MeshResult<Arc<dyn MeshTransport>> {
            Ok(Arc::new(StaticTransport {
                catalog: self.catalog.clone(),
                output: self.output.clone(),
            }))
        }
    }

    struct DownConnector;

    #[async_trait]
    impl MeshConnector for DownConnector {
        async fn connect(&self) -> MeshResult<Arc<dyn MeshTransport>> {
            Err(MeshError::ConnectionFailed("connection refused".into()))
        }
    }

    /// Cancels the request token inside the tool call, like a client that
    /// disconnects while the call is in flight.
    struct CancellingTransport {
        catalog: Vec<ToolDescriptor>,
        token: CancellationToken,
    }

    #[async_trait]
    impl MeshTransport for CancellingTransport {
        async fn list_tools(&self) -> MeshResult<Vec<ToolDescriptor>> {
            Ok(self.catalog.clone())
        }
        async fn call_tool(&self, _name: &str, _arguments: Value) -> MeshResult<Value> {
            self.token.cancel();
            Ok(json!({"bitcoin": {"usd": 64000}}))
        }
        async fn close(&self) -> MeshResult<()> {
            Ok(())
        }
    }

    struct CancellingConnector {
        catalog: Vec<ToolDescriptor>,
        token: CancellationToken,
    }

    #[async_trait]
    impl MeshConnector for CancellingConnector {
        async fn connect(&self) -> MeshResult<Arc<dyn MeshTransport>> {
            Ok(Arc::new(CancellingTransport {
                catalog: self.catalog.clone(),
                token: self.token.clone(),
            }))
        }
    }

    fn price_cache() -> Arc<ToolCache> {
        Arc::new(ToolCache::new(
            Arc::new(StaticConnector {
                catalog: vec![ToolDescriptor {
                    name: PRICE_TOOL.to_string(),
                    description: "Look up token prices".to_string(),
                    input_schema: json!({"type": "object"}),
                }],
                output: json!({"bitcoin": {"usd": 64000}}),
            }),
            ResponseFilter::default(),
            DEFAULT_TOOL_TTL,
        ))
    }

    fn down_cache() -> Arc<ToolCache> {
        Arc::new(ToolCache::new(
            Arc::new(DownConnector),
            ResponseFilter::default(),
            DEFAULT_TOOL_TTL,
        ))
    }

    fn engine(provider: MockProvider, tools: Arc<ToolCache>) -> ChatEngine {
        engine_with(provider, tools, EngineConfig {
            api_key: Some("test-key".into()),
            ..Default::default()
        })
    }

    fn engine_with(provider: MockProvider, tools: Arc<ToolCache>, config: EngineConfig) -> ChatEngine {
        ChatEngine::new(Arc::new(provider), tools, config)
    }

    async fn collect(mut stream: EventStream) -> Vec<ChatEvent> {
        let mut out = Vec::new();
        // Bounded wait so a stuck producer fails the test instead of hanging
        while let Ok(Some(ev)) =
            tokio::time::timeout(Duration::from_secs(5), stream.next()).await
        {
            out.push(ev);
        }
        out
    }

    fn finish_of(events: &[ChatEvent]) -> (StopReason, usize, usize) {
        events
            .iter()
            .find_map(|ev| match ev {
                ChatEvent::Finish {
                    stop_reason,
                    text_chars,
                    tool_calls,
                } => Some((*stop_reason, *text_chars, *tool_calls)),
                _ => None,
            })
            .expect("stream should end with a finish event")
    }

    #[tokio::test]
    async fn test_bitcoin_price_scenario() {
        // The model asks for the price tool once, then answers
        let provider = MockProvider::scripted(vec![
            vec![
                StreamChunk::text("Let me check the latest price."),
                StreamChunk::tool_call(ToolCall::new(
                    "c1",
                    PRICE_TOOL,
                    json!({"coins": ["bitcoin"]}),
                )),
                StreamChunk::end(None),
            ],
            vec![
                StreamChunk::text("Bitcoin is trading at $64,000."),
                StreamChunk::end(None),
            ],
        ]);
        let engine = engine(provider, price_cache());

        let events = collect(
            engine
                .stream_chat(
                    vec![ChatMessage::user("What is the price of bitcoin?")],
                    CancellationToken::new(),
                )
                .await
                .unwrap(),
        )
        .await;

        assert!(events
            .iter()
            .any(|ev| matches!(ev, ChatEvent::ToolCall { name, .. } if name == PRICE_TOOL)));
        assert!(events.iter().any(
            |ev| matches!(ev, ChatEvent::ToolResult { output, .. } if output["bitcoin"]["usd"] == json!(64000))
        ));

        let (stop, _, tool_calls) = finish_of(&events);
        assert_eq!(stop, StopReason::EndTurn);
        assert_eq!(tool_calls, 1);

        let answer: String = events
            .iter()
            .filter_map(|ev| match ev {
                ChatEvent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert!(answer.contains("$64,000"));
    }

    #[tokio::test]
    async fn test_streams_answer_without_tools_when_mesh_down() {
        let provider = MockProvider::fixed("Bitcoin is a decentralized currency.");
        let engine = engine(provider, down_cache());

        let events = collect(
            engine
                .stream_chat(
                    vec![ChatMessage::user("What is bitcoin?")],
                    CancellationToken::new(),
                )
                .await
                .unwrap(),
        )
        .await;

        let (stop, text_chars, tool_calls) = finish_of(&events);
        assert_eq!(stop, StopReason::EndTurn);
        assert_eq!(tool_calls, 0);
        assert!(text_chars > 0);
    }

    #[tokio::test]
    async fn test_empty_conversation_rejected() {
        let engine = engine(MockProvider::fixed("unused"), down_cache());
        let err = engine
            .stream_chat(vec![], CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::EmptyConversation));
    }

    #[tokio::test]
    async fn test_rate_limited_surfaces_before_streaming() {
        let provider = MockProvider::failing(|| ProviderError::RateLimited {
            message: "429 too many requests".into(),
        });
        let engine = engine(provider, down_cache());

        let err = engine
            .stream_chat(vec![ChatMessage::user("hi")], CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            EngineError::RateLimited {
                retry_after_secs: 60
            }
        ));
    }

    #[tokio::test]
    async fn test_step_limit_stops_tool_execution() {
        // Every turn asks for another tool call; with max_steps = 1 only one
        // round executes and the request finishes with StepLimit.
        let tool_turn = |id: &str| {
            vec![
                StreamChunk::tool_call(ToolCall::new(id, PRICE_TOOL, json!({}))),
                StreamChunk::end(None),
            ]
        };
        let provider = MockProvider::scripted(vec![tool_turn("c1"), tool_turn("c2")]);
        let engine = engine_with(provider, price_cache(), EngineConfig {
            max_steps: 1,
            api_key: Some("test-key".into()),
            ..Default::default()
        });

        let events = collect(
            engine
                .stream_chat(
                    vec![ChatMessage::user("compare every coin")],
                    CancellationToken::new(),
                )
                .await
                .unwrap(),
        )
        .await;

        let (stop, _, tool_calls) = finish_of(&events);
        assert_eq!(stop, StopReason::StepLimit);
        assert_eq!(tool_calls, 1);
    }

    #[tokio::test]
    async fn test_max_tokens_stop_reason() {
        let provider = MockProvider::scripted(vec![vec![
            StreamChunk::text("a very long answer cut short"),
            StreamChunk::end(Some(4096)),
        ]]);
        let engine = engine(provider, down_cache());

        let events = collect(
            engine
                .stream_chat(
                    vec![ChatMessage::user("write a novel")],
                    CancellationToken::new(),
                )
                .await
                .unwrap(),
        )
        .await;

        let (stop, _, _) = finish_of(&events);
        assert_eq!(stop, StopReason::MaxTokens);
    }

    #[tokio::test]
    async fn test_midstream_failure_surfaces_as_error_event() {
        // First chunk succeeds, then the upstream connection drops; the
        // failure arrives in-stream, not as a request-level error.
        let provider = MockProvider::scripted_results(vec![vec![
            Ok(StreamChunk::text("Bitcoin is")),
            Err(ProviderError::ApiError {
                status: 500,
                message: "upstream reset".into(),
            }),
        ]]);
        let engine = engine(provider, down_cache());

        let events = collect(
            engine
                .stream_chat(
                    vec![ChatMessage::user("What is bitcoin?")],
                    CancellationToken::new(),
                )
                .await
                .unwrap(),
        )
        .await;

        assert!(events
            .iter()
            .any(|ev| matches!(ev, ChatEvent::Text { text } if text == "Bitcoin is")));
        assert!(matches!(events.last(), Some(ChatEvent::Error { .. })));
        assert!(!events
            .iter()
            .any(|ev| matches!(ev, ChatEvent::Finish { .. })));
    }

    #[tokio::test]
    async fn test_disconnect_discards_inflight_tool_result() {
        // The token is cancelled while the tool call is in flight; the call
        // completes but its result is discarded and the stream just ends.
        let cancel = CancellationToken::new();
        let tools = Arc::new(ToolCache::new(
            Arc::new(CancellingConnector {
                catalog: vec![ToolDescriptor {
                    name: PRICE_TOOL.to_string(),
                    description: "Look up token prices".to_string(),
                    input_schema: json!({"type": "object"}),
                }],
                token: cancel.clone(),
            }),
            ResponseFilter::default(),
            DEFAULT_TOOL_TTL,
        ));
        let provider = MockProvider::scripted(vec![
            vec![
                StreamChunk::tool_call(ToolCall::new("c1", PRICE_TOOL, json!({}))),
                StreamChunk::end(None),
            ],
            vec![
                StreamChunk::text("should never stream"),
                StreamChunk::end(None),
            ],
        ]);
        let engine = engine(provider, tools);

        let events = collect(
            engine
                .stream_chat(
                    vec![ChatMessage::user("price of bitcoin?")],
                    cancel.clone(),
                )
                .await
                .unwrap(),
        )
        .await;

        assert!(events
            .iter()
            .any(|ev| matches!(ev, ChatEvent::ToolCall { .. })));
        assert!(!events
            .iter()
            .any(|ev| matches!(ev, ChatEvent::ToolResult { .. })));
        assert!(!events
            .iter()
            .any(|ev| matches!(ev, ChatEvent::Finish { .. })));
    }

    #[tokio::test]
    async fn test_tool_history_reaches_next_invocation() {
        let provider = MockProvider::scripted(vec![
            vec![
                StreamChunk::tool_call(ToolCall::new("c1", PRICE_TOOL, json!({}))),
                StreamChunk::end(None),
            ],
            vec![StreamChunk::text("done"), StreamChunk::end(None)],
        ]);
        let engine = ChatEngine::new(
            Arc::new(provider),
            price_cache(),
            EngineConfig {
                api_key: Some("test-key".into()),
                ..Default::default()
            },
        );

        let events = collect(
            engine
                .stream_chat(
                    vec![ChatMessage::user("price?")],
                    CancellationToken::new(),
                )
                .await
                .unwrap(),
        )
        .await;

        // Second invocation happened and saw the tool result
        assert!(events
            .iter()
            .any(|ev| matches!(ev, ChatEvent::Text { text } if text == "done")));
    }
}

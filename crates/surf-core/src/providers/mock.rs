//! Mock provider for testing
//!
//! Deterministic, scriptable streams without network dependencies. Each call
//! to `stream_chat` pops the next scripted turn, which is what the engine's
//! multi-step tool loop needs in tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;

use crate::types::{CancellationToken, ChatMessage, StreamChunk};

use super::error::{ProviderError, ProviderResult};
use super::traits::{ChatOptions, Provider, StreamResponse};

enum MockBehavior {
    /// Successive calls yield successive turns; an exhausted script yields an
    /// empty turn ending immediately.
    Scripted(Mutex<VecDeque<Vec<ProviderResult<StreamChunk>>>>),
    /// Every call fails with the produced error
    Failing(Box<dyn Fn() -> ProviderError + Send + Sync>),
}

/// Mock LLM provider
pub struct MockProvider {
    behavior: MockBehavior,
    calls: AtomicUsize,
    last_messages: Mutex<Vec<ChatMessage>>,
}

impl MockProvider {
    /// Script a sequence of turns, one per `stream_chat` call
    pub fn scripted(turns: Vec<Vec<StreamChunk>>) -> Self {
        Self::scripted_results(
            turns
                .into_iter()
                .map(|turn| turn.into_iter().map(Ok).collect())
                .collect(),
        )
    }

    /// Script turns that may fail mid-stream
    pub fn scripted_results(turns: Vec<Vec<ProviderResult<StreamChunk>>>) -> Self {
        Self {
            behavior: MockBehavior::Scripted(Mutex::new(turns.into())),
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        }
    }

    /// Single turn streaming the given text then ending
    pub fn fixed(text: impl Into<String>) -> Self {
        Self::scripted(vec![vec![
            StreamChunk::text(text),
            StreamChunk::end(None),
        ]])
    }

    /// Every call fails with the produced error
    pub fn failing(make_error: impl Fn() -> ProviderError + Send + Sync + 'static) -> Self {
        Self {
            behavior: MockBehavior::Failing(Box::new(make_error)),
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        }
    }

    /// Number of `stream_chat` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages passed to the most recent call
    pub fn last_messages(&self) -> Vec<ChatMessage> {
        self.last_messages.lock().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        _options: &ChatOptions,
        cancel: CancellationToken,
    ) -> ProviderResult<StreamResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock() = messages;

        let turn = match &self.behavior {
            MockBehavior::Failing(make_error) => return Err(make_error()),
            MockBehavior::Scripted(turns) => turns
                .lock()
                .pop_front()
                .unwrap_or_else(|| vec![Ok(StreamChunk::end(None))]),
        };

        let items: Vec<ProviderResult<StreamChunk>> = turn
            .into_iter()
            .map(move |item| {
                if cancel.is_cancelled() {
                    Err(ProviderError::Cancelled)
                } else {
                    item
                }
            })
            .collect();

        Ok(Box::pin(stream::iter(items)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    use crate::types::ToolCall;

    async fn collect(mut stream: StreamResponse) -> Vec<StreamChunk> {
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item.expect("chunk should succeed"));
        }
        out
    }

    #[tokio::test]
    async fn test_fixed_turn() {
        let provider = MockProvider::fixed("Bitcoin is trading at $64,000.");
        let stream = provider
            .stream_chat(
                vec![ChatMessage::user("price of btc?")],
                &ChatOptions::new("mock"),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let chunks = collect(stream).await;
        assert_eq!(chunks[0].as_text(), Some("Bitcoin is trading at $64,000."));
        assert!(matches!(chunks.last(), Some(StreamChunk::End { .. })));
    }

    #[tokio::test]
    async fn test_scripted_turns_pop_in_order() {
        let provider = MockProvider::scripted(vec![
            vec![
                StreamChunk::tool_call(ToolCall::new("c1", "get_token_price", json!({}))),
                StreamChunk::end(None),
            ],
            vec![StreamChunk::text("done"), StreamChunk::end(None)],
        ]);

        let opts = ChatOptions::new("mock");
        let first = collect(
            provider
                .stream_chat(vec![], &opts, CancellationToken::new())
                .await
                .unwrap(),
        )
        .await;
        assert!(matches!(first[0], StreamChunk::ToolCall { .. }));

        let second = collect(
            provider
                .stream_chat(vec![], &opts, CancellationToken::new())
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(second[0].as_text(), Some("done"));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_failing() {
        let provider = MockProvider::failing(|| ProviderError::RateLimited {
            message: "429".into(),
        });
        let err = provider
            .stream_chat(vec![], &ChatOptions::new("mock"), CancellationToken::new())
            .await
            .err()
            .expect("expected stream_chat to fail");
        assert!(matches!(err, ProviderError::RateLimited { .. }));
    }
}

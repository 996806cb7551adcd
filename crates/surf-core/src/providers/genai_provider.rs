//! Production provider backed by the genai crate
//!
//! Handles every genai-supported hosted API (Anthropic, OpenAI, Gemini, ...)
//! behind the `Provider` trait. Errors are classified into kinds at the point
//! they are first observed, so nothing downstream needs to inspect messages.

use async_trait::async_trait;
use futures::{stream, StreamExt};

use genai::chat::ChatRequest;

use crate::types::{CancellationToken, ChatMessage};

use super::error::{ProviderError, ProviderResult};
use super::genai_adapter::{
    create_client, extract_model_name, from_genai_event, to_genai_messages, to_genai_options,
    to_genai_tools,
};
use super::traits::{ChatOptions, Provider, StreamResponse};

/// Unified provider using genai for hosted LLM APIs
#[derive(Default)]
pub struct GenaiProvider;

impl GenaiProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Provider for GenaiProvider {
    fn name(&self) -> &str {
        "genai"
    }

    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        options: &ChatOptions,
        cancel: CancellationToken,
    ) -> ProviderResult<StreamResponse> {
        let model_name = extract_model_name(&options.model).to_string();
        tracing::debug!(model = %model_name, tools = options.tools.len(), "starting model stream");

        let client = create_client(options.api_key.clone());

        let mut chat_req = ChatRequest::new(to_genai_messages(messages));
        if !options.tools.is_empty() {
            chat_req = chat_req.with_tools(to_genai_tools(options.tools.clone()));
        }

        let genai_options = to_genai_options(options);

        let chat_stream = client
            .exec_chat_stream(&model_name, chat_req, Some(&genai_options))
            .await
            .map_err(|e| ProviderError::classify(None, e.to_string()))?;

        let stream = chat_stream
            .stream
            .map(move |result| {
                let items: Vec<ProviderResult<_>> = if cancel.is_cancelled() {
                    vec![Err(ProviderError::Cancelled)]
                } else {
                    match result {
                        Ok(event) => from_genai_event(event),
                        Err(e) => vec![Err(ProviderError::classify(None, e.to_string()))],
                    }
                };
                stream::iter(items)
            })
            .flatten();

        Ok(Box::pin(stream))
    }
}

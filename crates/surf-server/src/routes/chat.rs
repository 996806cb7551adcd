//! Chat endpoint
//!
//! `POST /api/chat` takes `{ "messages": [...] }` and streams engine events
//! back as SSE. The body is parsed by hand so malformed JSON maps to the
//! client-error arm with a JSON payload instead of a transport default.

use std::convert::Infallible;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use serde::Deserialize;

use surf_core::{CancellationToken, ChatMessage};

use crate::error::ApiError;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    pub messages: Vec<ChatMessage>,
}

/// Cancels the engine's token when the response stream is dropped, which is
/// how a client disconnect propagates to stop consuming model output.
struct DisconnectGuard(CancellationToken);

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

pub async fn chat(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let request: ChatRequestBody =
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::debug!(turns = request.messages.len(), "chat request received");

    let cancel = CancellationToken::new();
    let events = state
        .engine
        .stream_chat(request.messages, cancel.clone())
        .await
        .map_err(ApiError::from)?;

    let guard = DisconnectGuard(cancel);
    let sse_stream = events.map(move |event| {
        let _ = &guard;
        let payload = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().event(event.name()).data(payload))
    });

    Ok(Sse::new(sse_stream)
        .keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(15))))
}

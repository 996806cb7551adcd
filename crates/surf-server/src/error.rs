//! Engine-error to HTTP-status mapping
//!
//! Rate limits surface as 429 with a fixed retry suggestion; context
//! overflows and everything else are 500s with user-facing messages that
//! never leak internals.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use surf_core::{EngineError, RETRY_AFTER_SECS};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("malformed request body: {0}")]
    BadRequest(String),

    #[error("upstream rate limited")]
    RateLimited { retry_after_secs: u64 },

    #[error("conversation exceeds the model context window")]
    ContextTooLarge,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::EmptyConversation => ApiError::BadRequest(err.public_message()),
            EngineError::RateLimited { retry_after_secs } => {
                ApiError::RateLimited { retry_after_secs }
            }
            EngineError::ContextTooLarge => ApiError::ContextTooLarge,
            EngineError::Internal(detail) => ApiError::Internal(detail),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(details) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Invalid request body",
                    "details": details,
                })),
            )
                .into_response(),
            ApiError::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after_secs.to_string())],
                Json(json!({
                    "error": format!(
                        "Rate limited by the model provider. Please retry in about {retry_after_secs} seconds."
                    ),
                    "retryAfter": retry_after_secs,
                })),
            )
                .into_response(),
            ApiError::ContextTooLarge => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "The conversation is too large for the model. Try asking a narrower question.",
                })),
            )
                .into_response(),
            ApiError::Internal(detail) => {
                tracing::error!(detail = %detail, "chat request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

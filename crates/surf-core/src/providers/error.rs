//! Provider error types
//!
//! The error kind is attached here, at the point the upstream error is first
//! observed. Downstream code matches on the variant, never on message text.

use thiserror::Error;

/// Errors that can occur during provider operations
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The upstream API rejected the request for rate/quota reasons
    #[error("upstream rate limited: {message}")]
    RateLimited { message: String },

    /// The conversation exceeds the model's context window
    #[error("context window exceeded: {message}")]
    ContextTooLarge { message: String },

    /// API request failed with a known status
    #[error("api error ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// Request was cancelled
    #[error("request cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Classify a raw upstream error into a kind.
    ///
    /// When no structured status is available this falls back to matching
    /// the message text. That heuristic is fragile by nature; it is kept
    /// here so it exists in exactly one place.
    pub fn classify(status: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if status == Some(429)
            || lower.contains("rate limit")
            || lower.contains("too many requests")
            || lower.contains("429")
        {
            return ProviderError::RateLimited { message };
        }

        if lower.contains("prompt is too long")
            || lower.contains("maximum context")
            || (lower.contains("context") && (lower.contains("length") || lower.contains("window")))
        {
            return ProviderError::ContextTooLarge { message };
        }

        match status {
            Some(status) => ProviderError::ApiError { status, message },
            None => ProviderError::Other(message),
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_status() {
        let err = ProviderError::classify(Some(429), "slow down");
        assert!(matches!(err, ProviderError::RateLimited { .. }));

        let err = ProviderError::classify(Some(500), "boom");
        assert!(matches!(err, ProviderError::ApiError { status: 500, .. }));
    }

    #[test]
    fn test_classify_by_message() {
        let err = ProviderError::classify(None, "Error: rate limit exceeded, retry later");
        assert!(matches!(err, ProviderError::RateLimited { .. }));

        let err = ProviderError::classify(None, "prompt is too long: 250000 tokens");
        assert!(matches!(err, ProviderError::ContextTooLarge { .. }));

        let err = ProviderError::classify(None, "maximum context length is 200000 tokens");
        assert!(matches!(err, ProviderError::ContextTooLarge { .. }));

        let err = ProviderError::classify(None, "connection reset");
        assert!(matches!(err, ProviderError::Other(_)));
    }
}

//! Completion boundary error types

use std::time::Duration;

use thiserror::Error;

/// Errors crossing the external completion-service boundary
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion timed out after {0:?}")]
    Timeout(Duration),

    #[error("completion API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid completion response: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CompletionError {
    /// Whether a retry decorator may reasonably try again
    ///
    /// Timeouts are deliberately not retryable here: the engine treats a
    /// timeout as a stage failure; retry policy is an explicit wrapper.
    pub fn is_retryable(&self) -> bool {
        match self {
            CompletionError::Api { status, .. } => matches!(status, 408 | 429 | 500 | 502 | 503 | 504 | 529),
            CompletionError::Network(_) => true,
            CompletionError::Timeout(_) => false,
            CompletionError::InvalidResponse(_) => false,
            CompletionError::Json(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(
            CompletionError::Api {
                status: 500,
                message: "server error".to_string()
            }
            .is_retryable()
        );
        assert!(
            CompletionError::Api {
                status: 429,
                message: "rate limited".to_string()
            }
            .is_retryable()
        );
        assert!(
            !CompletionError::Api {
                status: 400,
                message: "bad request".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_timeout_is_not_retryable() {
        assert!(!CompletionError::Timeout(Duration::from_secs(30)).is_retryable());
    }

    #[test]
    fn test_invalid_response_is_not_retryable() {
        assert!(!CompletionError::InvalidResponse("garbage".to_string()).is_retryable());
    }
}

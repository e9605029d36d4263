//! CompletionClient trait definition

use async_trait::async_trait;

use super::{CompletionError, CompletionRequest, CompletionResponse};

/// Stateless completion client - each call is independent
///
/// This is the single boundary to the external text-completion service. No
/// conversation state is kept between calls, and the engine neither retries
/// nor caches through this trait; retry policy is an explicit decorator
/// ([`super::RetryingClient`]), never implicit behavior.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send one completion request and block until it resolves
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CompletionError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::debug;

    use crate::llm::TokenUsage;

    /// Mock completion client for unit tests
    pub struct MockCompletionClient {
        responses: Vec<CompletionResponse>,
        call_count: AtomicUsize,
    }

    impl MockCompletionClient {
        pub fn new(responses: Vec<CompletionResponse>) -> Self {
            debug!(response_count = %responses.len(), "MockCompletionClient::new: called");
            Self {
                responses,
                call_count: AtomicUsize::new(0),
            }
        }

        /// Convenience: one canned text per call, default usage
        pub fn from_texts(texts: &[&str]) -> Self {
            let responses = texts
                .iter()
                .map(|t| CompletionResponse {
                    text: t.to_string(),
                    usage: TokenUsage::default(),
                })
                .collect();
            Self::new(responses)
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionClient for MockCompletionClient {
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, CompletionError> {
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            debug!(%idx, "MockCompletionClient::complete: called");
            self.responses
                .get(idx)
                .cloned()
                .ok_or_else(|| CompletionError::InvalidResponse("no more mock responses".to_string()))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_client_returns_responses_in_order() {
            let client = MockCompletionClient::from_texts(&["first", "second"]);
            let request = CompletionRequest::new("hello");

            let first = client.complete(request.clone()).await.unwrap();
            assert_eq!(first.text, "first");

            let second = client.complete(request).await.unwrap();
            assert_eq!(second.text, "second");
            assert_eq!(client.call_count(), 2);
        }

        #[tokio::test]
        async fn test_mock_client_errors_when_exhausted() {
            let client = MockCompletionClient::new(vec![]);
            let result = client.complete(CompletionRequest::new("hello")).await;
            assert!(result.is_err());
        }
    }
}

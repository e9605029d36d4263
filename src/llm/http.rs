//! HTTP completion client and retry decorator
//!
//! [`HttpCompletionClient`] posts prompt text to a configurable completion
//! endpoint. [`RetryingClient`] is the explicit bounded-backoff decorator;
//! the engine itself never retries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{CompletionClient, CompletionError, CompletionRequest, CompletionResponse, TokenUsage};
use crate::config::LlmConfig;

/// Wire format of a completion endpoint response
#[derive(Debug, Deserialize)]
struct ApiResponse {
    text: String,
    #[serde(default)]
    usage: ApiUsage,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Plain HTTP client for an opaque completion service
pub struct HttpCompletionClient {
    endpoint: String,
    api_key: Option<String>,
    http: Client,
    timeout: Duration,
}

impl HttpCompletionClient {
    /// Create a client from configuration
    ///
    /// Reads the API key from the environment variable named in config, if
    /// one is configured.
    pub fn from_config(config: &LlmConfig) -> Result<Self, CompletionError> {
        debug!(endpoint = %config.endpoint, "HttpCompletionClient::from_config: called");
        let api_key = if config.api_key_env.is_empty() {
            None
        } else {
            match std::env::var(&config.api_key_env) {
                Ok(key) => Some(key),
                Err(_) => {
                    return Err(CompletionError::InvalidResponse(format!(
                        "API key not found; set the {} environment variable",
                        config.api_key_env
                    )));
                }
            }
        };

        let timeout = Duration::from_millis(config.timeout_ms);
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(CompletionError::Network)?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key,
            http,
            timeout,
        })
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CompletionError> {
        debug!(prompt_len = request.prompt_text.len(), "HttpCompletionClient::complete: called");

        let body = serde_json::json!({
            "prompt": request.prompt_text,
            "max_tokens": request.options.max_tokens,
            "temperature": request.options.temperature,
        });

        let mut http_request = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = match http_request.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Err(CompletionError::Timeout(self.timeout)),
            Err(e) => return Err(CompletionError::Network(e)),
        };

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "HttpCompletionClient::complete: API error");
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let api: ApiResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;

        Ok(CompletionResponse {
            text: api.text,
            usage: TokenUsage {
                input_tokens: api.usage.input_tokens,
                output_tokens: api.usage.output_tokens,
            },
        })
    }
}

/// Bounded exponential-backoff retry decorator
///
/// Wraps any client and retries only errors the boundary marks retryable.
pub struct RetryingClient<C> {
    inner: C,
    max_retries: u32,
    initial_backoff: Duration,
}

impl<C: CompletionClient> RetryingClient<C> {
    pub fn new(inner: C, max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            inner,
            max_retries,
            initial_backoff,
        }
    }
}

#[async_trait]
impl<C: CompletionClient> CompletionClient for RetryingClient<C> {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CompletionError> {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0;

        loop {
            match self.inner.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(%attempt, ?backoff, error = %e, "RetryingClient::complete: retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails with a retryable error a fixed number of times, then succeeds
    struct FlakyClient {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionClient for FlakyClient {
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, CompletionError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(CompletionError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                })
            } else {
                Ok(CompletionResponse {
                    text: "ok".to_string(),
                    usage: TokenUsage::default(),
                })
            }
        }
    }

    #[tokio::test]
    async fn test_retrying_client_recovers_within_budget() {
        let client = RetryingClient::new(
            FlakyClient {
                failures: 2,
                calls: AtomicUsize::new(0),
            },
            3,
            Duration::from_millis(1),
        );

        let response = client.complete(CompletionRequest::new("x")).await.unwrap();
        assert_eq!(response.text, "ok");
    }

    #[tokio::test]
    async fn test_retrying_client_gives_up_past_budget() {
        let client = RetryingClient::new(
            FlakyClient {
                failures: 5,
                calls: AtomicUsize::new(0),
            },
            2,
            Duration::from_millis(1),
        );

        let result = client.complete(CompletionRequest::new("x")).await;
        assert!(matches!(result, Err(CompletionError::Api { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_retrying_client_does_not_retry_timeouts() {
        struct TimeoutClient;

        #[async_trait]
        impl CompletionClient for TimeoutClient {
            async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, CompletionError> {
                Err(CompletionError::Timeout(Duration::from_secs(1)))
            }
        }

        let client = RetryingClient::new(TimeoutClient, 3, Duration::from_millis(1));
        let result = client.complete(CompletionRequest::new("x")).await;
        assert!(matches!(result, Err(CompletionError::Timeout(_))));
    }
}

//! Completion service boundary
//!
//! A single narrow interface to the external text-completion service:
//! `complete(prompt_text, options) -> text`. Everything behind it is opaque
//! to the engine.

use serde::{Deserialize, Serialize};

mod client;
mod error;
mod http;

pub use client::CompletionClient;
#[cfg(test)]
pub use client::mock;
pub use error::CompletionError;
pub use http::{HttpCompletionClient, RetryingClient};

/// Options for one completion call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.0,
        }
    }
}

/// One completion request: prompt text plus options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt_text: String,
    pub options: CompletionOptions,
}

impl CompletionRequest {
    pub fn new(prompt_text: impl Into<String>) -> Self {
        Self {
            prompt_text: prompt_text.into(),
            options: CompletionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }
}

/// Token consumption reported by the service
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// The service's answer to one completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
    pub usage: TokenUsage,
}

//! Quality assessment boundary
//!
//! `assess(output_text, rubric) -> QualityScore`, pluggable per task domain.
//! The default implementation asks the completion service to act as judge
//! and score each rubric dimension, returning strict JSON.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::llm::{CompletionClient, CompletionError, CompletionOptions, CompletionRequest};
use crate::quality::{QualityScore, Rubric, ValidationError};

/// Errors raised by an assessor
///
/// The refiner degrades these to quality 0 for the attempt rather than
/// aborting the loop.
#[derive(Debug, Error)]
pub enum AssessError {
    #[error("assessment completion failed: {0}")]
    Completion(#[from] CompletionError),

    #[error("assessor returned no parseable score: {0}")]
    MalformedScore(String),

    #[error("assessor omitted rubric dimension '{0}'")]
    MissingDimension(String),

    #[error("assessor returned invalid score: {0}")]
    Validation(#[from] ValidationError),
}

/// Pluggable scoring boundary
#[async_trait]
pub trait QualityAssessor: Send + Sync {
    /// Score an output against a rubric
    async fn assess(&self, output: &str, rubric: &Rubric) -> Result<QualityScore, AssessError>;
}

/// LLM-as-judge assessor
///
/// Prompts the completion service for a JSON object scoring every rubric
/// dimension in [0,1] and validates the result against the rubric.
pub struct LlmAssessor {
    client: Arc<dyn CompletionClient>,
    options: CompletionOptions,
}

impl LlmAssessor {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            options: CompletionOptions {
                max_tokens: 512,
                temperature: 0.0,
            },
        }
    }

    fn judge_prompt(output: &str, rubric: &Rubric) -> String {
        let mut prompt = String::from(
            "Score the following output on each dimension from 0.0 to 1.0.\n\
             Respond with ONLY a JSON object, no prose.\n\nDimensions: ",
        );
        let dims: Vec<&str> = rubric.dimensions().collect();
        prompt.push_str(&dims.join(", "));
        let _ = write!(prompt, "\n\nOutput to score:\n{}\n", output);
        prompt
    }

    /// Pull the first JSON object out of the response text
    fn extract_json(text: &str) -> Result<serde_json::Value, AssessError> {
        let start = text
            .find('{')
            .ok_or_else(|| AssessError::MalformedScore(text.chars().take(120).collect()))?;
        let end = text
            .rfind('}')
            .ok_or_else(|| AssessError::MalformedScore(text.chars().take(120).collect()))?;
        serde_json::from_str(&text[start..=end]).map_err(|e| AssessError::MalformedScore(e.to_string()))
    }
}

#[async_trait]
impl QualityAssessor for LlmAssessor {
    async fn assess(&self, output: &str, rubric: &Rubric) -> Result<QualityScore, AssessError> {
        debug!(output_len = output.len(), "LlmAssessor::assess: called");

        let request =
            CompletionRequest::new(Self::judge_prompt(output, rubric)).with_options(self.options.clone());
        let response = self.client.complete(request).await?;

        let json = Self::extract_json(&response.text)?;
        let mut dimensions = BTreeMap::new();
        for name in rubric.dimensions() {
            let value = json
                .get(name)
                .and_then(serde_json::Value::as_f64)
                .ok_or_else(|| AssessError::MissingDimension(name.to_string()))?;
            dimensions.insert(name.to_string(), value);
        }

        let score = rubric.score(dimensions)?;
        debug!(aggregate = score.aggregate(), "LlmAssessor::assess: scored");
        Ok(score)
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a scripted sequence of aggregate scores, one per call
    pub struct ScriptedAssessor {
        scores: Vec<f64>,
        call_count: AtomicUsize,
        /// Calls (0-based) that should fail with an assessment error
        failing_calls: Vec<usize>,
    }

    impl ScriptedAssessor {
        pub fn new(scores: Vec<f64>) -> Self {
            Self {
                scores,
                call_count: AtomicUsize::new(0),
                failing_calls: Vec::new(),
            }
        }

        pub fn failing_on(mut self, calls: Vec<usize>) -> Self {
            self.failing_calls = calls;
            self
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QualityAssessor for ScriptedAssessor {
        async fn assess(&self, _output: &str, rubric: &Rubric) -> Result<QualityScore, AssessError> {
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            if self.failing_calls.contains(&idx) {
                return Err(AssessError::MalformedScore("scripted failure".to_string()));
            }
            let aggregate = self
                .scores
                .get(idx)
                .copied()
                .unwrap_or_else(|| self.scores.last().copied().unwrap_or(0.0));
            // Uniform dimensions at the aggregate value keep the rubric honest
            let dimensions = rubric.dimensions().map(|d| (d.to_string(), aggregate)).collect();
            Ok(rubric.score(dimensions)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockCompletionClient;

    #[tokio::test]
    async fn test_llm_assessor_parses_json_scores() {
        let client = Arc::new(MockCompletionClient::from_texts(&[
            r#"{"correctness": 0.9, "clarity": 0.8, "completeness": 0.7, "efficiency": 0.6}"#,
        ]));
        let assessor = LlmAssessor::new(client);

        let score = assessor.assess("some output", &Rubric::default()).await.unwrap();
        let expected = 0.9 * 0.40 + 0.8 * 0.25 + 0.7 * 0.20 + 0.6 * 0.15;
        assert!((score.aggregate() - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_llm_assessor_tolerates_surrounding_prose() {
        let client = Arc::new(MockCompletionClient::from_texts(&[
            "Here are the scores:\n{\"correctness\": 1.0, \"clarity\": 1.0, \"completeness\": 1.0, \"efficiency\": 1.0}\nDone.",
        ]));
        let assessor = LlmAssessor::new(client);

        let score = assessor.assess("output", &Rubric::default()).await.unwrap();
        assert!((score.aggregate() - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_llm_assessor_rejects_missing_dimension() {
        let client = Arc::new(MockCompletionClient::from_texts(&[r#"{"correctness": 0.9}"#]));
        let assessor = LlmAssessor::new(client);

        let result = assessor.assess("output", &Rubric::default()).await;
        assert!(matches!(result, Err(AssessError::MissingDimension(_))));
    }

    #[tokio::test]
    async fn test_llm_assessor_rejects_out_of_range_scores() {
        let client = Arc::new(MockCompletionClient::from_texts(&[
            r#"{"correctness": 1.4, "clarity": 0.8, "completeness": 0.7, "efficiency": 0.6}"#,
        ]));
        let assessor = LlmAssessor::new(client);

        let result = assessor.assess("output", &Rubric::default()).await;
        assert!(matches!(result, Err(AssessError::Validation(_))));
    }

    #[tokio::test]
    async fn test_llm_assessor_rejects_non_json() {
        let client = Arc::new(MockCompletionClient::from_texts(&["looks great to me!"]));
        let assessor = LlmAssessor::new(client);

        let result = assessor.assess("output", &Rubric::default()).await;
        assert!(matches!(result, Err(AssessError::MalformedScore(_))));
    }
}

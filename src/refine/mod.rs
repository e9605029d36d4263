//! Iterative quality-graded refinement
//!
//! The refiner drives the execute → assess → refine loop for one prompt:
//! call the completion service, score the output against the rubric, stop
//! when the aggregate quality clears the threshold, otherwise synthesize a
//! refinement instruction from the quality gap and go again.
//!
//! State machine per attempt:
//!
//! ```text
//! PENDING -> EXECUTING -> ASSESSING -> CONVERGED          (terminal success)
//!                 ^            |
//!                 +- ITERATING +---- -> EXHAUSTED         (terminal success)
//!                                    -> FAILED            (terminal error)
//! ```
//!
//! The loop always returns the best-quality result observed, never a later
//! regression. Assessment failures score the attempt 0 and keep looping;
//! completion failures are retried while iterations remain, then surface as
//! a `Failed` outcome carrying the typed error.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::assess::QualityAssessor;
use crate::config::{LlmConfig, MonitorConfig, RefineConfig};
use crate::domain::{GradedValue, Observation, Prompt, Task};
use crate::error::EngineError;
use crate::functor::PromptFunctor;
use crate::llm::{CompletionClient, CompletionError, CompletionOptions, CompletionRequest};
use crate::quality::{QualityMonitor, QualityScore, Rubric, Trend};

/// Phases of one refinement run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinePhase {
    Pending,
    Executing,
    Assessing,
    Iterating,
    Converged,
    Exhausted,
    Failed,
}

/// Terminal result of a refinement run
#[derive(Debug)]
pub enum RefineOutcome {
    /// Quality threshold reached
    Converged,
    /// Iteration cap reached without convergence; best result returned
    Exhausted,
    /// Completion service failed past the retry budget
    Failed { error: CompletionError },
}

impl RefineOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, RefineOutcome::Failed { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RefineOutcome::Converged => "converged",
            RefineOutcome::Exhausted => "exhausted",
            RefineOutcome::Failed { .. } => "failed",
        }
    }
}

/// One attempt in the refinement history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub output: String,
    pub quality: f64,
    /// Whether this attempt became the best result so far
    pub accepted: bool,
}

/// Result of a refinement run
#[derive(Debug)]
pub struct Refinement {
    /// Best-quality prompt observed, at its assessed quality
    pub best: GradedValue<Prompt>,
    /// Output text of the best attempt; empty when no attempt completed
    pub output: String,
    pub outcome: RefineOutcome,
    pub iterations: u32,
    /// Tokens consumed across all attempts, including failed ones
    pub tokens_used: u64,
    /// Full attempt history, regressions included
    pub history: Option<Observation<IterationRecord>>,
    /// Quality trajectory over the run
    pub trend: Trend,
}

/// Iterative refiner over the completion and assessment boundaries
pub struct Refiner {
    functor: PromptFunctor,
    client: Arc<dyn CompletionClient>,
    assessor: Arc<dyn QualityAssessor>,
    rubric: Rubric,
    config: RefineConfig,
    monitor_config: MonitorConfig,
    options: CompletionOptions,
}

impl Refiner {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        assessor: Arc<dyn QualityAssessor>,
        config: RefineConfig,
        monitor_config: MonitorConfig,
    ) -> Self {
        Self {
            functor: PromptFunctor::new(),
            client,
            assessor,
            rubric: Rubric::default(),
            config,
            monitor_config,
            options: CompletionOptions::default(),
        }
    }

    /// Replace the default rubric
    pub fn with_rubric(mut self, rubric: Rubric) -> Self {
        self.rubric = rubric;
        self
    }

    /// Take completion options from the service configuration
    pub fn with_llm_config(mut self, llm: &LlmConfig) -> Self {
        self.options = CompletionOptions {
            max_tokens: llm.max_tokens,
            temperature: 0.0,
        };
        self
    }

    /// Run the refinement loop for a task
    ///
    /// Classification errors are structural and propagate; everything past
    /// that point resolves into a [`Refinement`] whose outcome reports how
    /// the loop ended.
    pub async fn run(&self, task: &Task) -> Result<Refinement, EngineError> {
        let initial = self.functor.apply(task)?;
        self.refine(initial).await
    }

    /// Run the refinement loop for an already-built prompt
    pub async fn refine(&self, initial: Prompt) -> Result<Refinement, EngineError> {
        let mut phase = RefinePhase::Pending;
        let mut monitor = QualityMonitor::new(self.monitor_config.window_size, self.monitor_config.trend_epsilon);
        let mut current = initial.clone();
        let mut best: Option<GradedValue<Prompt>> = None;
        let mut best_output = String::new();
        let mut history: Option<Observation<IterationRecord>> = None;
        let mut tokens_used = 0u64;
        let mut iterations = 0u32;

        info!(
            ?phase,
            threshold = self.config.quality_threshold,
            max_iterations = self.config.max_iterations,
            "Refiner::refine: starting"
        );

        let outcome = loop {
            if iterations >= self.config.max_iterations {
                phase = RefinePhase::Exhausted;
                break RefineOutcome::Exhausted;
            }
            iterations += 1;

            phase = RefinePhase::Executing;
            debug!(iteration = iterations, ?phase, "Refiner::refine: executing");
            let request = CompletionRequest::new(current.text()).with_options(self.options.clone());
            let response = match self.client.complete(request).await {
                Ok(r) => r,
                Err(e) if e.is_retryable() && iterations < self.config.max_iterations => {
                    warn!(iteration = iterations, error = %e, "Refiner::refine: completion failed, retrying");
                    continue;
                }
                Err(e) => {
                    phase = RefinePhase::Failed;
                    warn!(iteration = iterations, error = %e, "Refiner::refine: completion failed terminally");
                    break RefineOutcome::Failed { error: e };
                }
            };
            tokens_used += response.usage.total();

            phase = RefinePhase::Assessing;
            debug!(iteration = iterations, ?phase, "Refiner::refine: assessing");
            let quality = match self.assessor.assess(&response.text, &self.rubric).await {
                Ok(score) => score,
                Err(e) => {
                    // Assessment failure degrades to quality 0 for this
                    // attempt; the loop keeps its remaining budget.
                    warn!(iteration = iterations, error = %e, "Refiner::refine: assessment failed, scoring 0");
                    QualityScore::zero()
                }
            };
            let aggregate = quality.aggregate();

            // Monitoring sees every attempt, regressions included
            if let Err(e) = monitor.record(&quality, Utc::now()) {
                warn!(error = %e, "Refiner::refine: monitor rejected score");
            }

            let accepted = best
                .as_ref()
                .map(|b| aggregate > b.quality().aggregate())
                .unwrap_or(true);
            let record = IterationRecord {
                iteration: iterations,
                output: response.text.clone(),
                quality: aggregate,
                accepted,
            };
            history = Some(match history.take() {
                Some(h) => h.advance(record),
                None => Observation::new(record),
            });

            if accepted {
                best = Some(GradedValue::new(current.clone(), quality.clone()));
                best_output = response.text.clone();
            }

            if aggregate >= self.config.quality_threshold {
                phase = RefinePhase::Converged;
                info!(iteration = iterations, aggregate, "Refiner::refine: converged");
                break RefineOutcome::Converged;
            }

            phase = RefinePhase::Iterating;
            debug!(iteration = iterations, aggregate, ?phase, "Refiner::refine: below threshold");
            let instruction = self.synthesize_refinement(&quality, &monitor);
            current = current.with_appended(&instruction);

            if self.config.pacing_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.pacing_ms)).await;
            }
        };

        debug!(?phase, iterations, "Refiner::refine: finished");
        Ok(Refinement {
            best: best.unwrap_or_else(|| GradedValue::unit(initial)),
            output: best_output,
            outcome,
            iterations,
            tokens_used,
            history,
            trend: monitor.get_trend(),
        })
    }

    /// Build a revision instruction from the quality gap
    ///
    /// Names the weakest rubric dimensions explicitly and adds a
    /// trend-aware hint when the monitor sees quality degrading.
    fn synthesize_refinement(&self, quality: &QualityScore, monitor: &QualityMonitor) -> String {
        let mut instruction = String::from("\n## Revision guidance\n");

        match quality.dimensions() {
            Some(dimensions) => {
                let mut weakest: Vec<(&String, &f64)> = dimensions
                    .iter()
                    .filter(|(_, v)| **v < self.config.quality_threshold)
                    .collect();
                weakest.sort_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));
                for (name, value) in weakest.iter().take(3) {
                    let _ = writeln!(instruction, "- Improve {} (currently scored {:.2}).", name, value);
                }
            }
            None => {
                let _ = writeln!(
                    instruction,
                    "- Overall quality scored {:.2}; revise for correctness and clarity.",
                    quality.aggregate()
                );
            }
        }

        if monitor.is_degrading(self.monitor_config.degradation_threshold) {
            instruction.push_str("- Recent revisions are losing quality; return to the earlier approach and refine it instead.\n");
        }
        instruction
    }
}

//! Composition execution engine
//!
//! Walks a [`CompositionNode`] tree over a [`StageExecutor`], threading
//! outputs and combining quality per operator:
//!
//! - Sequence: output of each stage feeds the next; quality is the
//!   component-wise minimum across stages.
//! - Parallel: branches run as tokio tasks on the same input; quality is
//!   aggregated per the configured strategy (mean by default).
//! - Tensor: both sides run concurrently on the same input; the result is a
//!   pair and quality is the minimum.
//! - Kleisli: the chained stages iterate until the threshold or the
//!   iteration cap; only strict quality improvements are accepted, so the
//!   accepted chain is monotone non-decreasing. Regressed iterations are
//!   discarded from the value chain but still recorded into the quality
//!   monitor.
//!
//! Every executed leaf appends a checkpoint to the run's [`BudgetLedger`].
//! Once any checkpoint halts, no further stages launch and the run surfaces
//! a budget error together with the partial ledger.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assess::QualityAssessor;
use crate::config::{AggregationStrategy, ComposeConfig, MonitorConfig, RefineConfig};
use crate::domain::Task;
use crate::error::EngineError;
use crate::ledger::{BudgetLedger, Checkpoint, CheckpointStatus, VarianceThresholds, variance};
use crate::llm::CompletionClient;
use crate::quality::{QualityMonitor, QualityScore, Rubric, Trend};
use crate::refine::{RefineOutcome, Refiner};

use super::node::{CompositionNode, Stage};
use super::parser::parse_expression;

/// Output and cost of one executed stage
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub output: String,
    pub quality: QualityScore,
    pub tokens_used: u64,
}

/// Boundary the engine drives leaf stages through
#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn execute(&self, stage: &Stage, input: &str) -> Result<StageOutput, EngineError>;
}

/// Structured output of a composition run
///
/// Sequences and Kleisli chains resolve to the text of their final stage;
/// parallel and tensor nodes keep their branch structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum NodeOutput {
    Text { text: String },
    Branches { outputs: Vec<String> },
    Pair { left: Box<NodeOutput>, right: Box<NodeOutput> },
}

impl NodeOutput {
    /// Flatten to text for feeding a downstream stage
    pub fn render(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::Branches { outputs } => outputs.join("\n\n---\n\n"),
            Self::Pair { left, right } => {
                format!("{}\n\n---\n\n{}", left.render(), right.render())
            }
        }
    }
}

/// Successful composition run
#[derive(Debug)]
pub struct Execution {
    pub run_id: Uuid,
    pub output: NodeOutput,
    pub quality: QualityScore,
    pub checkpoints: Vec<Checkpoint>,
    pub total_tokens: u64,
}

/// Failed composition run, carrying the partial ledger
#[derive(Debug, thiserror::Error)]
#[error("composition run {run_id} failed after {} checkpoints: {error}", checkpoints.len())]
pub struct CompositionFailure {
    pub run_id: Uuid,
    #[source]
    pub error: EngineError,
    pub checkpoints: Vec<Checkpoint>,
    pub total_tokens: u64,
}

struct EngineInner {
    executor: Arc<dyn StageExecutor>,
    config: ComposeConfig,
    thresholds: VarianceThresholds,
    monitor: Mutex<QualityMonitor>,
}

/// Executes composition trees over a stage executor
#[derive(Clone)]
pub struct CompositionEngine {
    inner: Arc<EngineInner>,
}

impl CompositionEngine {
    pub fn new(
        executor: Arc<dyn StageExecutor>,
        config: ComposeConfig,
        monitor_config: &MonitorConfig,
        thresholds: VarianceThresholds,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                executor,
                config,
                thresholds,
                monitor: Mutex::new(QualityMonitor::new(
                    monitor_config.window_size,
                    monitor_config.trend_epsilon,
                )),
            }),
        }
    }

    /// Execute a composition tree against an input
    pub async fn run(&self, node: &CompositionNode, input: &str) -> Result<Execution, CompositionFailure> {
        let run_id = Uuid::now_v7();
        let ledger = BudgetLedger::new(run_id, self.inner.thresholds);
        info!(%run_id, node = %node.label(), "CompositionEngine::run: starting");

        let result = walk(
            Arc::clone(&self.inner),
            node.clone(),
            input.to_string(),
            0,
            ledger.clone(),
        )
        .await;

        match result {
            Ok((output, quality)) => {
                info!(%run_id, quality = quality.aggregate(), total_tokens = ledger.total_tokens(), "CompositionEngine::run: completed");
                Ok(Execution {
                    run_id,
                    output,
                    quality,
                    checkpoints: ledger.checkpoints(),
                    total_tokens: ledger.total_tokens(),
                })
            }
            Err(error) => {
                warn!(%run_id, %error, "CompositionEngine::run: failed");
                Err(CompositionFailure {
                    run_id,
                    error,
                    checkpoints: ledger.checkpoints(),
                    total_tokens: ledger.total_tokens(),
                })
            }
        }
    }

    /// Parse a composition expression and execute it
    pub async fn run_expression(&self, expression: &str, input: &str) -> Result<Execution, CompositionFailure> {
        let node = match parse_expression(expression) {
            Ok(node) => node,
            Err(err) => {
                return Err(CompositionFailure {
                    run_id: Uuid::now_v7(),
                    error: EngineError::Parse(err),
                    checkpoints: Vec::new(),
                    total_tokens: 0,
                });
            }
        };
        self.run(&node, input).await
    }

    /// Trend over all qualities observed by this engine
    pub fn trend(&self) -> Trend {
        match self.inner.monitor.lock() {
            Ok(monitor) => monitor.get_trend(),
            Err(_) => Trend::Stable,
        }
    }
}

/// Reconstruct the budget error from the checkpoint that raised the halt
fn halt_error(ledger: &BudgetLedger) -> EngineError {
    let halted = ledger
        .checkpoints()
        .into_iter()
        .rev()
        .find(|c| c.status == CheckpointStatus::Halt);
    match halted {
        Some(c) => EngineError::BudgetExceeded {
            stage_id: c.stage_id,
            variance: c.variance,
        },
        None => EngineError::BudgetExceeded {
            stage_id: "unknown".to_string(),
            variance: 0.0,
        },
    }
}

fn record_quality(inner: &EngineInner, quality: &QualityScore) {
    if let Ok(mut monitor) = inner.monitor.lock() {
        // Already-validated scores cannot fail re-validation
        let _ = monitor.record(quality, chrono::Utc::now());
    }
}

fn walk(
    inner: Arc<EngineInner>,
    node: CompositionNode,
    input: String,
    branch_index: usize,
    ledger: BudgetLedger,
) -> BoxFuture<'static, Result<(NodeOutput, QualityScore), EngineError>> {
    Box::pin(async move {
        if ledger.halted() {
            return Err(halt_error(&ledger));
        }
        match node {
            CompositionNode::Leaf { stage } => run_leaf(&inner, &stage, &input, branch_index, &ledger).await,
            CompositionNode::Sequence { nodes } => {
                run_sequence(inner, nodes, input, branch_index, ledger).await
            }
            CompositionNode::Parallel { nodes } => {
                run_parallel(inner, nodes, input, ledger).await
            }
            CompositionNode::Tensor { left, right } => {
                run_tensor(inner, *left, *right, input, branch_index, ledger).await
            }
            CompositionNode::Kleisli {
                stages,
                threshold,
                max_iterations,
            } => run_kleisli(inner, stages, threshold, max_iterations, input, branch_index, ledger).await,
        }
    })
}

async fn run_leaf(
    inner: &EngineInner,
    stage: &Stage,
    input: &str,
    branch_index: usize,
    ledger: &BudgetLedger,
) -> Result<(NodeOutput, QualityScore), EngineError> {
    debug!(stage = %stage.name, branch_index, "CompositionEngine: executing stage");
    let result = inner.executor.execute(stage, input).await?;

    let expected = stage.modifiers.budget.unwrap_or(inner.config.default_expected_tokens);
    let status = ledger.record_stage(
        &stage.name,
        branch_index,
        result.tokens_used,
        expected,
        result.quality.aggregate(),
    );
    record_quality(inner, &result.quality);

    if status == CheckpointStatus::Halt {
        return Err(EngineError::BudgetExceeded {
            stage_id: stage.name.clone(),
            variance: variance(result.tokens_used, expected),
        });
    }
    Ok((NodeOutput::Text { text: result.output }, result.quality))
}

async fn run_sequence(
    inner: Arc<EngineInner>,
    nodes: Vec<CompositionNode>,
    input: String,
    branch_index: usize,
    ledger: BudgetLedger,
) -> Result<(NodeOutput, QualityScore), EngineError> {
    let mut current = input;
    let mut quality: Option<QualityScore> = None;
    let mut output = NodeOutput::Text { text: current.clone() };

    for node in nodes {
        if ledger.halted() {
            return Err(halt_error(&ledger));
        }
        let (out, q) = walk(Arc::clone(&inner), node, current, branch_index, ledger.clone()).await?;
        current = out.render();
        output = out;
        quality = Some(match quality {
            Some(prev) => prev.combine_min(&q),
            None => q,
        });
    }
    Ok((output, quality.unwrap_or_else(QualityScore::perfect)))
}

async fn run_parallel(
    inner: Arc<EngineInner>,
    nodes: Vec<CompositionNode>,
    input: String,
    ledger: BudgetLedger,
) -> Result<(NodeOutput, QualityScore), EngineError> {
    let mut set = JoinSet::new();
    let mut task_branches = std::collections::HashMap::new();
    for (index, node) in nodes.into_iter().enumerate() {
        let inner = Arc::clone(&inner);
        let input = input.clone();
        let ledger = ledger.clone();
        let handle = set.spawn(async move {
            let result = walk(inner, node, input, index, ledger).await;
            (index, result)
        });
        task_branches.insert(handle.id(), index);
    }

    let mut branches: Vec<Option<(NodeOutput, QualityScore)>> = Vec::new();
    while let Some(joined) = set.join_next_with_id().await {
        let (index, result) = match joined {
            Ok((_, pair)) => pair,
            Err(err) => {
                return Err(EngineError::Branch {
                    branch_index: task_branches.get(&err.id()).copied().unwrap_or(0),
                    message: err.to_string(),
                });
            }
        };
        let value = result?;
        if branches.len() <= index {
            branches.resize_with(index + 1, || None);
        }
        branches[index] = Some(value);
    }

    let mut outputs = Vec::new();
    let mut qualities = Vec::new();
    for (index, slot) in branches.into_iter().enumerate() {
        let (out, q) = slot.ok_or_else(|| EngineError::Branch {
            branch_index: index,
            message: "branch produced no result".to_string(),
        })?;
        outputs.push(out.render());
        qualities.push(q);
    }

    let quality = aggregate_parallel(&qualities, inner.config.parallel_aggregation)?;
    Ok((NodeOutput::Branches { outputs }, quality))
}

/// Combine branch qualities per the configured strategy
///
/// Min preserves vector structure via component-wise combination; mean and
/// max collapse to a scalar over the branch aggregates.
fn aggregate_parallel(
    qualities: &[QualityScore],
    strategy: AggregationStrategy,
) -> Result<QualityScore, EngineError> {
    if qualities.is_empty() {
        return Ok(QualityScore::perfect());
    }
    match strategy {
        AggregationStrategy::Min => {
            let mut iter = qualities.iter();
            let mut combined = match iter.next() {
                Some(first) => first.clone(),
                None => QualityScore::perfect(),
            };
            for q in iter {
                combined = combined.combine_min(q);
            }
            Ok(combined)
        }
        AggregationStrategy::Mean => {
            let mean = qualities.iter().map(|q| q.aggregate()).sum::<f64>() / qualities.len() as f64;
            Ok(QualityScore::scalar(mean)?)
        }
        AggregationStrategy::Max => {
            let max = qualities.iter().map(|q| q.aggregate()).fold(0.0_f64, f64::max);
            Ok(QualityScore::scalar(max)?)
        }
    }
}

async fn run_tensor(
    inner: Arc<EngineInner>,
    left: CompositionNode,
    right: CompositionNode,
    input: String,
    branch_index: usize,
    ledger: BudgetLedger,
) -> Result<(NodeOutput, QualityScore), EngineError> {
    // Both sides stay in the enclosing branch; only parallel nodes assign
    // branch indices, so a checkpoint's index always names its originating
    // parallel branch.
    let left_fut = walk(Arc::clone(&inner), left, input.clone(), branch_index, ledger.clone());
    let right_fut = walk(inner, right, input, branch_index, ledger);
    let ((left_out, left_q), (right_out, right_q)) = futures::future::try_join(left_fut, right_fut).await?;

    let quality = left_q.combine_min(&right_q);
    Ok((
        NodeOutput::Pair {
            left: Box::new(left_out),
            right: Box::new(right_out),
        },
        quality,
    ))
}

async fn run_kleisli(
    inner: Arc<EngineInner>,
    stages: Vec<CompositionNode>,
    threshold: f64,
    max_iterations: u32,
    input: String,
    branch_index: usize,
    ledger: BudgetLedger,
) -> Result<(NodeOutput, QualityScore), EngineError> {
    let mut best: Option<(NodeOutput, QualityScore)> = None;
    let mut current = input;

    for iteration in 1..=max_iterations {
        if ledger.halted() {
            return Err(halt_error(&ledger));
        }
        let (out, quality) = run_sequence(
            Arc::clone(&inner),
            stages.clone(),
            current.clone(),
            branch_index,
            ledger.clone(),
        )
        .await?;
        let aggregate = quality.aggregate();
        debug!(iteration, aggregate, threshold, "CompositionEngine: kleisli iteration");

        let accepted = match &best {
            None => true,
            Some((_, best_q)) => aggregate > best_q.aggregate(),
        };
        if accepted {
            current = out.render();
            best = Some((out, quality));
        } else {
            // Regression: the attempt stays visible to the monitor (recorded
            // by its leaves) but never enters the accepted chain.
            debug!(iteration, aggregate, "CompositionEngine: kleisli regression discarded");
        }

        if let Some((_, best_q)) = &best {
            if best_q.aggregate() >= threshold {
                break;
            }
        }
    }

    match best {
        Some((output, quality)) => Ok((output, quality)),
        // max_iterations is validated >= 1, so at least one iteration ran
        None => Ok((NodeOutput::Text { text: current }, QualityScore::zero())),
    }
}

/// [`StageExecutor`] that drives each stage through the refinement loop
///
/// The stage name becomes the task description, the upstream text its
/// context. Stage modifiers override the refinement threshold and
/// iteration cap for that stage alone.
pub struct RefinerExecutor {
    client: Arc<dyn CompletionClient>,
    assessor: Arc<dyn QualityAssessor>,
    rubric: Rubric,
    refine: RefineConfig,
    monitor: MonitorConfig,
}

impl RefinerExecutor {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        assessor: Arc<dyn QualityAssessor>,
        refine: RefineConfig,
        monitor: MonitorConfig,
    ) -> Self {
        Self {
            client,
            assessor,
            rubric: Rubric::default(),
            refine,
            monitor,
        }
    }

    pub fn with_rubric(mut self, rubric: Rubric) -> Self {
        self.rubric = rubric;
        self
    }

    fn stage_config(&self, stage: &Stage) -> RefineConfig {
        let mut config = self.refine.clone();
        if let Some(quality) = stage.modifiers.quality {
            config.quality_threshold = quality;
        }
        if let Some(cap) = stage.modifiers.max_iterations {
            config.max_iterations = cap;
        }
        config
    }
}

#[async_trait]
impl StageExecutor for RefinerExecutor {
    async fn execute(&self, stage: &Stage, input: &str) -> Result<StageOutput, EngineError> {
        let description = if input.is_empty() {
            stage.name.clone()
        } else {
            format!("{}\n\nInput:\n{}", stage.name, input)
        };
        let task = Task::new(description);

        let refiner = Refiner::new(
            Arc::clone(&self.client),
            Arc::clone(&self.assessor),
            self.stage_config(stage),
            self.monitor.clone(),
        )
        .with_rubric(self.rubric.clone());

        let refinement = refiner.run(&task).await?;
        if let RefineOutcome::Failed { error } = refinement.outcome {
            return Err(EngineError::Completion(error));
        }
        let (_, quality) = refinement.best.into_parts();
        Ok(StageOutput {
            output: refinement.output,
            quality,
            tokens_used: refinement.tokens_used,
        })
    }
}

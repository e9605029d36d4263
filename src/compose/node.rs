//! Composition expression tree
//!
//! A [`CompositionNode`] is built once per invocation (from the parser or
//! by hand) and walked by the engine; it is never mutated during execution.

use serde::{Deserialize, Serialize};

/// Per-stage settings attached via `@key:value` modifiers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageModifiers {
    /// Expected token budget for the stage's checkpoint
    pub budget: Option<u64>,
    /// Stage-level quality target
    pub quality: Option<f64>,
    /// Stage-level iteration cap
    pub max_iterations: Option<u32>,
}

/// One named pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub modifiers: StageModifiers,
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modifiers: StageModifiers::default(),
        }
    }
}

/// Immutable composition tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum CompositionNode {
    /// A single executable stage
    Leaf { stage: Stage },
    /// Strictly ordered; each output feeds the next input; quality = min
    Sequence { nodes: Vec<CompositionNode> },
    /// Concurrent against the same input; quality = configured aggregation
    Parallel { nodes: Vec<CompositionNode> },
    /// Two independent capabilities combined; quality = min
    Tensor {
        left: Box<CompositionNode>,
        right: Box<CompositionNode>,
    },
    /// Iterate the chained stages until the threshold or the iteration cap
    Kleisli {
        stages: Vec<CompositionNode>,
        threshold: f64,
        max_iterations: u32,
    },
}

impl CompositionNode {
    pub fn leaf(stage: Stage) -> Self {
        Self::Leaf { stage }
    }

    /// Build a sequence; a single child collapses to the child itself, so
    /// sequencing one node is identical to executing it directly.
    pub fn sequence(mut nodes: Vec<CompositionNode>) -> Self {
        if nodes.len() == 1 {
            nodes.pop().unwrap_or_else(|| unreachable!("len checked"))
        } else {
            Self::Sequence { nodes }
        }
    }

    pub fn parallel(nodes: Vec<CompositionNode>) -> Self {
        Self::Parallel { nodes }
    }

    pub fn tensor(left: CompositionNode, right: CompositionNode) -> Self {
        Self::Tensor {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn kleisli(stages: Vec<CompositionNode>, threshold: f64, max_iterations: u32) -> Self {
        Self::Kleisli {
            stages,
            threshold,
            max_iterations,
        }
    }

    /// A short label for ledger entries
    pub fn label(&self) -> String {
        match self {
            Self::Leaf { stage } => stage.name.clone(),
            Self::Sequence { nodes } => format!("sequence[{}]", nodes.len()),
            Self::Parallel { nodes } => format!("parallel[{}]", nodes.len()),
            Self::Tensor { .. } => "tensor".to_string(),
            Self::Kleisli { stages, .. } => format!("kleisli[{}]", stages.len()),
        }
    }
}

//! Composition of stages into pipelines
//!
//! An expression like `draft → (review || critique) → merge` parses into a
//! [`CompositionNode`] tree which the [`CompositionEngine`] executes over a
//! [`StageExecutor`], recording budget checkpoints along the way.

mod engine;
mod node;
mod parser;

pub use engine::{
    CompositionEngine, CompositionFailure, Execution, NodeOutput, RefinerExecutor, StageExecutor,
    StageOutput,
};
pub use node::{CompositionNode, Stage, StageModifiers};
pub use parser::{ChainDefaults, ParseError, parse_expression, parse_expression_with};

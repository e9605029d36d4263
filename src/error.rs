//! Crate-level error taxonomy
//!
//! Per-module error types are defined next to the code that raises them;
//! [`EngineError`] unifies them at the engine surface. Structural errors
//! (classification, parse, budget, validation) abort the enclosing
//! composition node; leaf errors (completion, assessment) are absorbed by
//! the refiner within its iteration budget.

use thiserror::Error;

use crate::assess::AssessError;
use crate::compose::ParseError;
use crate::domain::EmptyContextError;
use crate::functor::ClassifyError;
use crate::llm::CompletionError;
use crate::quality::ValidationError;

/// Unified engine error
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Assess(#[from] AssessError),

    #[error("budget exceeded at stage '{stage_id}': variance {variance:.2} above halt threshold")]
    BudgetExceeded { stage_id: String, variance: f64 },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("parallel branch {branch_index} aborted: {message}")]
    Branch { branch_index: usize, message: String },

    #[error(transparent)]
    EmptyContext(#[from] EmptyContextError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl EngineError {
    /// Structural errors abort composition and propagate unchanged; the
    /// engine never masks them as degraded quality.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            EngineError::Classify(_)
                | EngineError::Parse(_)
                | EngineError::BudgetExceeded { .. }
                | EngineError::Branch { .. }
                | EngineError::Validation(_)
        )
    }
}

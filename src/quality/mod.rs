//! Quality model
//!
//! Scalar and vector quality scores, assessment rubrics, and the windowed
//! quality monitor. This is the foundation every other subsystem builds on:
//! composition rules, refinement convergence, and budget checkpoints all
//! consume the aggregate values defined here.

mod monitor;
mod rubric;
mod score;

pub use monitor::{DimensionStats, QualityMonitor, Trend};
pub use rubric::Rubric;
pub use score::{QualityScore, ValidationError};

//! Assessment rubric
//!
//! A rubric names the quality dimensions an assessor must score and the
//! weight each dimension carries in the aggregate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::score::{QualityScore, ValidationError};

/// Named quality dimensions with weights summing to 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    /// Dimension name -> weight
    pub weights: BTreeMap<String, f64>,
}

impl Rubric {
    /// Build a rubric from (dimension, weight) pairs
    pub fn new(pairs: &[(&str, f64)]) -> Self {
        Self {
            weights: pairs.iter().map(|(k, w)| (k.to_string(), *w)).collect(),
        }
    }

    /// Dimension names in deterministic order
    pub fn dimensions(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    /// Build a validated vector score from per-dimension values
    pub fn score(&self, dimensions: BTreeMap<String, f64>) -> Result<QualityScore, ValidationError> {
        QualityScore::vector(dimensions, self.weights.clone())
    }
}

impl Default for Rubric {
    /// Default weights: correctness 0.40, clarity 0.25, completeness 0.20,
    /// efficiency 0.15
    fn default() -> Self {
        Self::new(&[
            ("correctness", 0.40),
            ("clarity", 0.25),
            ("completeness", 0.20),
            ("efficiency", 0.15),
        ])
    }
}

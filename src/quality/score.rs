//! Quality score representation
//!
//! A [`QualityScore`] is either a scalar in [0,1] or a named vector of
//! dimensions (each in [0,1]) with a weight vector summing to 1. All
//! construction paths validate ranges; an out-of-range value is a
//! [`ValidationError`], never a silent clamp.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance for weight-sum and float comparisons
const EPSILON: f64 = 1e-9;

/// Errors raised when a quality value fails validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("quality value {value} for '{dimension}' outside [0,1]")]
    OutOfRange { dimension: String, value: f64 },

    #[error("weights sum to {sum}, expected 1.0")]
    WeightSum { sum: f64 },

    #[error("dimension '{name}' has no matching weight")]
    DimensionMismatch { name: String },

    #[error("vector quality score must have at least one dimension")]
    EmptyVector,
}

/// A [0,1]-valued measure of output fitness
///
/// Scalar scores carry a single aggregate value. Vector scores carry named
/// dimensions plus a weight per dimension; [`QualityScore::aggregate`]
/// collapses them to the weighted sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum QualityScore {
    Scalar {
        value: f64,
    },
    Vector {
        dimensions: BTreeMap<String, f64>,
        weights: BTreeMap<String, f64>,
    },
}

impl QualityScore {
    /// Create a scalar score, validating the [0,1] range
    pub fn scalar(value: f64) -> Result<Self, ValidationError> {
        if !(0.0..=1.0).contains(&value) || value.is_nan() {
            return Err(ValidationError::OutOfRange {
                dimension: "scalar".to_string(),
                value,
            });
        }
        Ok(Self::Scalar { value })
    }

    /// The unit score: quality 1.0, no claim yet evaluated
    pub fn perfect() -> Self {
        Self::Scalar { value: 1.0 }
    }

    /// The zero score, used when assessment fails outright
    pub fn zero() -> Self {
        Self::Scalar { value: 0.0 }
    }

    /// Create a vector score, validating ranges, weight sum, and key parity
    pub fn vector(
        dimensions: BTreeMap<String, f64>,
        weights: BTreeMap<String, f64>,
    ) -> Result<Self, ValidationError> {
        if dimensions.is_empty() {
            return Err(ValidationError::EmptyVector);
        }
        for (name, value) in &dimensions {
            if !(0.0..=1.0).contains(value) || value.is_nan() {
                return Err(ValidationError::OutOfRange {
                    dimension: name.clone(),
                    value: *value,
                });
            }
            if !weights.contains_key(name) {
                return Err(ValidationError::DimensionMismatch { name: name.clone() });
            }
        }
        for name in weights.keys() {
            if !dimensions.contains_key(name) {
                return Err(ValidationError::DimensionMismatch { name: name.clone() });
            }
        }
        let sum: f64 = weights.values().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ValidationError::WeightSum { sum });
        }
        Ok(Self::Vector { dimensions, weights })
    }

    /// Collapse to a single [0,1] value
    ///
    /// Scalars return themselves; vectors return the weighted sum of their
    /// dimensions. The invariant that every component lies in [0,1] and the
    /// weights sum to 1 guarantees the aggregate stays in [0,1].
    pub fn aggregate(&self) -> f64 {
        match self {
            Self::Scalar { value } => *value,
            Self::Vector { dimensions, weights } => dimensions
                .iter()
                .map(|(name, value)| value * weights.get(name).copied().unwrap_or(0.0))
                .sum(),
        }
    }

    /// Named dimensions, if vector-valued
    pub fn dimensions(&self) -> Option<&BTreeMap<String, f64>> {
        match self {
            Self::Scalar { .. } => None,
            Self::Vector { dimensions, .. } => Some(dimensions),
        }
    }

    /// Combine two scores by taking the minimum
    ///
    /// This is the degradation rule used by monadic `bind` and tensor
    /// composition: component-wise min when both sides are vectors over the
    /// same dimensions, otherwise the min mapped through each side. A scalar
    /// combined against a vector lowers each dimension to at most the scalar,
    /// so combining with 1.0 is the identity in either representation.
    pub fn combine_min(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Scalar { value: a }, Self::Scalar { value: b }) => Self::Scalar { value: a.min(*b) },
            (
                Self::Vector {
                    dimensions: da,
                    weights: wa,
                },
                Self::Vector { dimensions: db, .. },
            ) if da.len() == db.len() && da.keys().eq(db.keys()) => {
                let dimensions = da
                    .iter()
                    .map(|(name, a)| (name.clone(), a.min(db[name])))
                    .collect();
                Self::Vector {
                    dimensions,
                    weights: wa.clone(),
                }
            }
            (Self::Scalar { value }, Self::Vector { dimensions, weights }) => {
                let dimensions = dimensions
                    .iter()
                    .map(|(name, d)| (name.clone(), d.min(*value)))
                    .collect();
                Self::Vector {
                    dimensions,
                    weights: weights.clone(),
                }
            }
            (Self::Vector { dimensions, weights }, Self::Scalar { value }) => {
                let dimensions = dimensions
                    .iter()
                    .map(|(name, d)| (name.clone(), d.min(*value)))
                    .collect();
                Self::Vector {
                    dimensions,
                    weights: weights.clone(),
                }
            }
            // Mismatched dimension sets fall back to the scalar min of aggregates
            (a, b) => Self::Scalar {
                value: a.aggregate().min(b.aggregate()),
            },
        }
    }

    /// Compare by aggregate value within float tolerance
    pub fn approx_eq(&self, other: &Self) -> bool {
        (self.aggregate() - other.aggregate()).abs() < EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_scalar_in_range() {
        assert!(QualityScore::scalar(0.0).is_ok());
        assert!(QualityScore::scalar(1.0).is_ok());
        assert!(QualityScore::scalar(0.85).is_ok());
    }

    #[test]
    fn test_scalar_out_of_range() {
        assert!(QualityScore::scalar(-0.1).is_err());
        assert!(QualityScore::scalar(1.1).is_err());
        assert!(QualityScore::scalar(f64::NAN).is_err());
    }

    #[test]
    fn test_vector_aggregate_is_weighted_sum() {
        let score = QualityScore::vector(
            dims(&[("correctness", 0.8), ("clarity", 0.6)]),
            dims(&[("correctness", 0.75), ("clarity", 0.25)]),
        )
        .unwrap();

        assert!((score.aggregate() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_vector_rejects_bad_weight_sum() {
        let result = QualityScore::vector(
            dims(&[("correctness", 0.8)]),
            dims(&[("correctness", 0.5)]),
        );
        assert!(matches!(result, Err(ValidationError::WeightSum { .. })));
    }

    #[test]
    fn test_vector_rejects_mismatched_keys() {
        let result = QualityScore::vector(
            dims(&[("correctness", 0.8)]),
            dims(&[("clarity", 1.0)]),
        );
        assert!(matches!(result, Err(ValidationError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_vector_rejects_empty() {
        let result = QualityScore::vector(BTreeMap::new(), BTreeMap::new());
        assert!(matches!(result, Err(ValidationError::EmptyVector)));
    }

    #[test]
    fn test_combine_min_scalars() {
        let a = QualityScore::scalar(0.9).unwrap();
        let b = QualityScore::scalar(0.7).unwrap();
        assert!((a.combine_min(&b).aggregate() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_combine_min_vectors_componentwise() {
        let weights = dims(&[("correctness", 0.5), ("clarity", 0.5)]);
        let a = QualityScore::vector(dims(&[("correctness", 0.9), ("clarity", 0.4)]), weights.clone()).unwrap();
        let b = QualityScore::vector(dims(&[("correctness", 0.6), ("clarity", 0.8)]), weights).unwrap();

        let combined = a.combine_min(&b);
        let dims = combined.dimensions().unwrap();
        assert!((dims["correctness"] - 0.6).abs() < 1e-9);
        assert!((dims["clarity"] - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_combine_min_with_perfect_is_identity() {
        let weights = dims(&[("correctness", 0.5), ("clarity", 0.5)]);
        let vector =
            QualityScore::vector(dims(&[("correctness", 0.9), ("clarity", 0.4)]), weights).unwrap();

        let combined = QualityScore::perfect().combine_min(&vector);
        assert_eq!(combined, vector);

        let combined = vector.combine_min(&QualityScore::perfect());
        assert_eq!(combined, vector);
    }
}

//! Quality-graded values
//!
//! [`GradedValue`] pairs a value with the quality score claimed for it. It
//! carries `unit`/`bind` operations forming a (graded) monad:
//!
//! - `unit(v)` wraps with quality 1.0 (no claim yet evaluated)
//! - `bind(m, f)` applies `f` and takes the min of both qualities,
//!   component-wise when vector-valued
//!
//! Laws the operations preserve (verified in tests, including property
//! tests over the quality lattice):
//!
//! - left identity:  `bind(unit(a), f) == f(a)`
//! - right identity: `bind(m, unit) == m`
//! - associativity:  `bind(bind(m, f), g) == bind(m, |x| bind(f(x), g))`

use serde::{Deserialize, Serialize};

use crate::quality::QualityScore;

/// A value with the quality score claimed for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedValue<T> {
    value: T,
    quality: QualityScore,
}

impl<T> GradedValue<T> {
    /// Wrap a value at a known quality
    pub fn new(value: T, quality: QualityScore) -> Self {
        Self { value, quality }
    }

    /// Wrap a value with quality 1.0; no claim has been evaluated yet
    pub fn unit(value: T) -> Self {
        Self {
            value,
            quality: QualityScore::perfect(),
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn quality(&self) -> &QualityScore {
        &self.quality
    }

    pub fn into_parts(self) -> (T, QualityScore) {
        (self.value, self.quality)
    }

    /// Transform the value, keeping the quality claim
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> GradedValue<U> {
        GradedValue {
            value: f(self.value),
            quality: self.quality,
        }
    }

    /// Monadic bind: apply `f`, degrade quality to the min of both sides
    ///
    /// A chain of binds can therefore never claim a higher quality than its
    /// weakest step.
    pub fn bind<U>(self, f: impl FnOnce(T) -> GradedValue<U>) -> GradedValue<U> {
        let next = f(self.value);
        GradedValue {
            value: next.value,
            quality: self.quality.combine_min(&next.quality),
        }
    }
}

//! Quality monitoring
//!
//! Windowed statistics over a stream of quality scores:
//! - Bounded circular window of the last N recorded scores
//! - Linear trend fit with degradation alarms
//! - Per-dimension breakdown for vector-valued quality
//!
//! The monitor is purely additive record-keeping; it never mutates the
//! scores it observes.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::score::{QualityScore, ValidationError};

/// Quality trajectory over the monitoring window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trend {
    /// Positive slope beyond the trend epsilon
    Improving,
    /// Window not yet full; no verdict either way
    Stable,
    /// Full window with near-zero slope
    Plateau,
    /// Negative slope beyond the trend epsilon
    Degrading,
}

/// Per-dimension summary statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DimensionStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub latest: f64,
}

/// One recorded quality sample
#[derive(Debug, Clone, Serialize, Deserialize)]
struct QualitySample {
    aggregate: f64,
    dimensions: Option<BTreeMap<String, f64>>,
    recorded_at: DateTime<Utc>,
}

/// Windowed quality statistics with trend detection
#[derive(Debug, Clone)]
pub struct QualityMonitor {
    window: VecDeque<QualitySample>,
    capacity: usize,
    /// Slope magnitude below which the trend counts as flat
    trend_epsilon: f64,
}

impl QualityMonitor {
    /// Create a monitor holding the last `capacity` scores
    pub fn new(capacity: usize, trend_epsilon: f64) -> Self {
        debug!(capacity, trend_epsilon, "QualityMonitor::new: called");
        Self {
            window: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            trend_epsilon,
        }
    }

    /// Record a score into the window
    ///
    /// Scores outside [0,1] are rejected; a valid `QualityScore` cannot carry
    /// one, but the check guards against callers constructing aggregates by
    /// other means.
    pub fn record(&mut self, quality: &QualityScore, timestamp: DateTime<Utc>) -> Result<(), ValidationError> {
        let aggregate = quality.aggregate();
        if !(0.0..=1.0).contains(&aggregate) || aggregate.is_nan() {
            warn!(aggregate, "QualityMonitor::record: rejecting out-of-range aggregate");
            return Err(ValidationError::OutOfRange {
                dimension: "aggregate".to_string(),
                value: aggregate,
            });
        }

        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(QualitySample {
            aggregate,
            dimensions: quality.dimensions().cloned(),
            recorded_at: timestamp,
        });
        debug!(aggregate, window_len = self.window.len(), "QualityMonitor::record: recorded");
        Ok(())
    }

    /// Number of samples currently in the window
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// True when nothing has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Least-squares slope of aggregate quality over the window
    ///
    /// Sample index is the x axis, so the slope reads as quality change per
    /// recorded score. Returns 0.0 with fewer than two samples.
    pub fn slope(&self) -> f64 {
        let n = self.window.len();
        if n < 2 {
            return 0.0;
        }
        let n_f = n as f64;
        let mean_x = (n_f - 1.0) / 2.0;
        let mean_y = self.window.iter().map(|s| s.aggregate).sum::<f64>() / n_f;

        let mut num = 0.0;
        let mut den = 0.0;
        for (i, sample) in self.window.iter().enumerate() {
            let dx = i as f64 - mean_x;
            num += dx * (sample.aggregate - mean_y);
            den += dx * dx;
        }
        if den == 0.0 { 0.0 } else { num / den }
    }

    /// True when the fitted slope is negative beyond `threshold`
    pub fn is_degrading(&self, threshold: f64) -> bool {
        let slope = self.slope();
        let degrading = slope < -threshold.abs();
        if degrading {
            warn!(slope, threshold, "QualityMonitor::is_degrading: degradation detected");
        }
        degrading
    }

    /// Classify the current trajectory
    pub fn get_trend(&self) -> Trend {
        let slope = self.slope();
        if slope > self.trend_epsilon {
            Trend::Improving
        } else if slope < -self.trend_epsilon {
            Trend::Degrading
        } else if self.window.len() == self.capacity {
            Trend::Plateau
        } else {
            Trend::Stable
        }
    }

    /// Latest recorded aggregate, if any
    pub fn latest(&self) -> Option<f64> {
        self.window.back().map(|s| s.aggregate)
    }

    /// Mean aggregate over the window
    pub fn mean(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().map(|s| s.aggregate).sum::<f64>() / self.window.len() as f64
    }

    /// Per-dimension statistics for vector-valued samples in the window
    pub fn component_breakdown(&self) -> BTreeMap<String, DimensionStats> {
        let mut breakdown: BTreeMap<String, DimensionStats> = BTreeMap::new();
        for sample in &self.window {
            let Some(dimensions) = &sample.dimensions else {
                continue;
            };
            for (name, value) in dimensions {
                let stats = breakdown.entry(name.clone()).or_insert_with(|| DimensionStats {
                    min: f64::MAX,
                    max: f64::MIN,
                    ..Default::default()
                });
                stats.count += 1;
                stats.min = stats.min.min(*value);
                stats.max = stats.max.max(*value);
                stats.mean += *value;
                stats.latest = *value;
            }
        }
        for stats in breakdown.values_mut() {
            if stats.count > 0 {
                stats.mean /= stats.count as f64;
            }
        }
        breakdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor_with(values: &[f64]) -> QualityMonitor {
        let mut monitor = QualityMonitor::new(10, 0.01);
        for v in values {
            monitor
                .record(&QualityScore::scalar(*v).unwrap(), Utc::now())
                .unwrap();
        }
        monitor
    }

    #[test]
    fn test_record_and_len() {
        let monitor = monitor_with(&[0.5, 0.6, 0.7]);
        assert_eq!(monitor.len(), 3);
        assert_eq!(monitor.latest(), Some(0.7));
    }

    #[test]
    fn test_window_is_bounded() {
        let mut monitor = QualityMonitor::new(3, 0.01);
        for v in [0.1, 0.2, 0.3, 0.4, 0.5] {
            monitor
                .record(&QualityScore::scalar(v).unwrap(), Utc::now())
                .unwrap();
        }
        assert_eq!(monitor.len(), 3);
        // Oldest samples evicted
        assert!((monitor.mean() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_improving_trend() {
        let monitor = monitor_with(&[0.5, 0.6, 0.7, 0.8]);
        assert_eq!(monitor.get_trend(), Trend::Improving);
        assert!(!monitor.is_degrading(0.01));
    }

    #[test]
    fn test_degrading_trend() {
        let monitor = monitor_with(&[0.9, 0.7, 0.5, 0.3]);
        assert_eq!(monitor.get_trend(), Trend::Degrading);
        assert!(monitor.is_degrading(0.05));
    }

    #[test]
    fn test_plateau_when_window_full_and_flat() {
        let mut monitor = QualityMonitor::new(4, 0.01);
        for _ in 0..4 {
            monitor
                .record(&QualityScore::scalar(0.8).unwrap(), Utc::now())
                .unwrap();
        }
        assert_eq!(monitor.get_trend(), Trend::Plateau);
    }

    #[test]
    fn test_stable_with_short_flat_history() {
        let monitor = monitor_with(&[0.8, 0.8]);
        assert_eq!(monitor.get_trend(), Trend::Stable);
    }

    #[test]
    fn test_component_breakdown() {
        use std::collections::BTreeMap;

        let weights: BTreeMap<String, f64> =
            [("correctness".to_string(), 0.5), ("clarity".to_string(), 0.5)].into();
        let mut monitor = QualityMonitor::new(10, 0.01);

        for (c, cl) in [(0.6, 0.9), (0.8, 0.7)] {
            let dims: BTreeMap<String, f64> =
                [("correctness".to_string(), c), ("clarity".to_string(), cl)].into();
            let score = QualityScore::vector(dims, weights.clone()).unwrap();
            monitor.record(&score, Utc::now()).unwrap();
        }

        let breakdown = monitor.component_breakdown();
        let correctness = &breakdown["correctness"];
        assert_eq!(correctness.count, 2);
        assert!((correctness.min - 0.6).abs() < 1e-9);
        assert!((correctness.max - 0.8).abs() < 1e-9);
        assert!((correctness.mean - 0.7).abs() < 1e-9);
        assert!((correctness.latest - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_out_of_range() {
        // Bypass the constructor to simulate a corrupted score
        let bad = QualityScore::Scalar { value: 1.5 };
        let mut monitor = QualityMonitor::new(5, 0.01);
        assert!(monitor.record(&bad, Utc::now()).is_err());
    }
}

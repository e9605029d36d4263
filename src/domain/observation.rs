//! Context-aware observations
//!
//! [`Observation`] pairs a focused value with the ordered history that led
//! to it. It carries the comonadic operations:
//!
//! - `extract` returns the current focus
//! - `duplicate` re-focuses at every point in history, producing an
//!   observation of observations (context-of-context)
//! - `extend(f)` applies a history-aware function at the focus while giving
//!   `f` the full context
//!
//! Identity laws verified in tests: `extract(duplicate(o)) == o` and
//! `map(extract, duplicate(o)) == o`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when an observation would have no focus value
#[derive(Debug, Error, PartialEq, Eq)]
#[error("observation has no focus; seed it with at least one value")]
pub struct EmptyContextError;

/// A focused value together with its execution history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation<T> {
    focus: T,
    history: Vec<T>,
    metadata: BTreeMap<String, serde_json::Value>,
}

impl<T> Observation<T> {
    /// Seed an observation with its first focus value
    pub fn new(focus: T) -> Self {
        Self {
            focus,
            history: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Build from an ordered history; the last entry becomes the focus
    pub fn from_history(mut entries: Vec<T>) -> Result<Self, EmptyContextError> {
        let focus = entries.pop().ok_or(EmptyContextError)?;
        Ok(Self {
            focus,
            history: entries,
            metadata: BTreeMap::new(),
        })
    }

    /// The current focus
    pub fn extract(&self) -> &T {
        &self.focus
    }

    /// Prior entries, oldest first (excludes the focus)
    pub fn history(&self) -> &[T] {
        &self.history
    }

    /// Focus plus history length
    pub fn len(&self) -> usize {
        self.history.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false // a constructed observation always has a focus
    }

    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    /// Return a copy with a metadata entry set
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Advance: the focus joins history and `next` becomes the new focus
    pub fn advance(mut self, next: T) -> Self {
        self.history.push(self.focus);
        Self {
            focus: next,
            history: self.history,
            metadata: self.metadata,
        }
    }

    /// The last `n` values observed, oldest first, focus included
    pub fn recent(&self, n: usize) -> Vec<&T> {
        if n == 0 {
            return Vec::new();
        }
        let mut out: Vec<&T> = self
            .history
            .iter()
            .rev()
            .take(n.saturating_sub(1))
            .collect();
        out.reverse();
        out.push(&self.focus);
        out
    }
}

impl<T: Clone> Observation<T> {
    /// Transform every value while keeping the context shape
    pub fn map<B>(&self, f: impl Fn(&T) -> B) -> Observation<B> {
        Observation {
            focus: f(&self.focus),
            history: self.history.iter().map(&f).collect(),
            metadata: self.metadata.clone(),
        }
    }

    /// Re-focus at every point in history
    ///
    /// The result's focus is this observation itself; its history holds the
    /// observation as it looked when each prior entry was the focus. This is
    /// what makes meta-observation (context about context) possible.
    pub fn duplicate(&self) -> Observation<Observation<T>> {
        let past: Vec<Observation<T>> = (0..self.history.len())
            .map(|i| Observation {
                focus: self.history[i].clone(),
                history: self.history[..i].to_vec(),
                metadata: self.metadata.clone(),
            })
            .collect();

        Observation {
            focus: self.clone(),
            history: past,
            metadata: self.metadata.clone(),
        }
    }

    /// Apply a context-aware function at every focus point
    ///
    /// `extend(f) == map(f, duplicate(self))`: `f` sees the full observation
    /// available at each point in time, not just the value.
    pub fn extend<B>(&self, f: impl Fn(&Observation<T>) -> B) -> Observation<B> {
        self.duplicate().map(|obs| f(obs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Observation<i32> {
        Observation::new(1).advance(2).advance(3)
    }

    #[test]
    fn test_from_history_requires_entries() {
        assert_eq!(Observation::<i32>::from_history(vec![]), Err(EmptyContextError));

        let obs = Observation::from_history(vec![1, 2, 3]).unwrap();
        assert_eq!(*obs.extract(), 3);
        assert_eq!(obs.history(), &[1, 2]);
    }

    #[test]
    fn test_advance_appends_to_history() {
        let obs = seeded();
        assert_eq!(*obs.extract(), 3);
        assert_eq!(obs.history(), &[1, 2]);
        assert_eq!(obs.len(), 3);
    }

    #[test]
    fn test_extract_after_duplicate_is_identity() {
        let obs = seeded();
        let doubled = obs.duplicate();
        assert_eq!(doubled.extract(), &obs);
    }

    #[test]
    fn test_map_extract_over_duplicate_is_identity() {
        let obs = seeded();
        let rebuilt = obs.duplicate().map(|inner| *inner.extract());
        assert_eq!(rebuilt, obs);
    }

    #[test]
    fn test_duplicate_history_refocuses_at_each_entry() {
        let obs = seeded();
        let doubled = obs.duplicate();

        // At the time 2 was the focus, history was [1]
        let at_two = &doubled.history()[1];
        assert_eq!(*at_two.extract(), 2);
        assert_eq!(at_two.history(), &[1]);
    }

    #[test]
    fn test_extend_sees_full_context() {
        let obs = seeded();
        // Sum of everything visible at each point in time
        let sums = obs.extend(|o| o.history().iter().sum::<i32>() + o.extract());

        assert_eq!(*sums.extract(), 6); // 1 + 2 + 3
        assert_eq!(sums.history(), &[1, 3]); // [1], [1+2]
    }

    #[test]
    fn test_recent_window() {
        let obs = seeded();
        let recent: Vec<i32> = obs.recent(2).into_iter().copied().collect();
        assert_eq!(recent, vec![2, 3]);

        let all: Vec<i32> = obs.recent(10).into_iter().copied().collect();
        assert_eq!(all, vec![1, 2, 3]);

        assert!(obs.recent(0).is_empty());
    }

    #[test]
    fn test_metadata_round_trip() {
        let obs = Observation::new("x").with_metadata("run", serde_json::json!(7));
        assert_eq!(obs.metadata()["run"], serde_json::json!(7));
    }
}

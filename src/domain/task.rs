//! Task value type
//!
//! A [`Task`] is the immutable unit of work handed to the engine. It is
//! created by the caller and never mutated; builder methods return new
//! values.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Ordered complexity tiers, lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Complexity {
    Trivial,
    Simple,
    Moderate,
    Complex,
    Epic,
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Trivial => "trivial",
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
            Self::Epic => "epic",
        };
        write!(f, "{}", name)
    }
}

/// An immutable unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    description: String,
    #[serde(rename = "complexity-hint")]
    complexity_hint: Option<Complexity>,
    constraints: BTreeSet<String>,
}

impl Task {
    /// Create a task from its description
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            complexity_hint: None,
            constraints: BTreeSet::new(),
        }
    }

    /// Return a copy with an explicit complexity hint
    pub fn with_hint(mut self, hint: Complexity) -> Self {
        self.complexity_hint = Some(hint);
        self
    }

    /// Return a copy with one more constraint
    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.insert(constraint.into());
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn complexity_hint(&self) -> Option<Complexity> {
        self.complexity_hint
    }

    /// Constraints in deterministic (sorted) order
    pub fn constraints(&self) -> &BTreeSet<String> {
        &self.constraints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complexity_ordering() {
        assert!(Complexity::Trivial < Complexity::Simple);
        assert!(Complexity::Simple < Complexity::Moderate);
        assert!(Complexity::Moderate < Complexity::Complex);
        assert!(Complexity::Complex < Complexity::Epic);
    }

    #[test]
    fn test_builder_does_not_mutate_original() {
        let base = Task::new("write a parser");
        let hinted = base.clone().with_hint(Complexity::Complex);

        assert_eq!(base.complexity_hint(), None);
        assert_eq!(hinted.complexity_hint(), Some(Complexity::Complex));
    }

    #[test]
    fn test_constraints_are_sorted_and_deduped() {
        let task = Task::new("t")
            .with_constraint("beta")
            .with_constraint("alpha")
            .with_constraint("beta");

        let constraints: Vec<_> = task.constraints().iter().cloned().collect();
        assert_eq!(constraints, vec!["alpha".to_string(), "beta".to_string()]);
    }
}

//! Task-to-prompt functor
//!
//! [`PromptFunctor`] maps a [`Task`] to an initial [`Prompt`]: classify the
//! task into a complexity tier, pick an assembly strategy, and render the
//! prompt from components in the closed registry. The mapping is a pure
//! function of the task; identical inputs always yield identical prompts.
//!
//! Structure preservation: for a task transformation with a prompt-level
//! counterpart (adding a constraint has [`PromptFunctor::lift_constraint`]),
//! transforming then applying equals applying then lifting, provided the
//! transformation does not change the classification tier.

use handlebars::Handlebars;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::domain::{
    ComponentRef, Complexity, ContextComponent, OutputComponent, Prompt, ReasoningComponent, Task,
};

/// Errors raised while classifying a task
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("task description is empty")]
    EmptyDescription,

    #[error("task description is unparseable: {0}")]
    Unparseable(String),
}

/// Prompt assembly strategy, one per classification outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Direct,
    ExampleAugmented,
    StepwiseReasoning,
    Branching,
}

/// Signal words that bump the classified tier up by one
const COMPLEXITY_KEYWORDS: &[&str] = &[
    "architecture",
    "concurrent",
    "design",
    "distributed",
    "migrate",
    "prove",
    "refactor",
];

const BASE_TEMPLATE: &str = "## Task\n{{description}}\n";

/// Closed registry: every component maps to a fixed snippet
fn snippet(component: ComponentRef) -> &'static str {
    match component {
        ComponentRef::Context(ContextComponent::Minimal) => "",
        ComponentRef::Context(ContextComponent::TaskFocused) => {
            "\n## Goal\nFocus on exactly what the task asks for; state assumptions explicitly.\n"
        }
        ComponentRef::Context(ContextComponent::ExampleRich) => {
            "\n## Example\nInput: a short, well-defined request.\nOutput: a direct, complete answer in the requested shape.\n"
        }
        ComponentRef::Reasoning(ReasoningComponent::Direct) => "",
        ComponentRef::Reasoning(ReasoningComponent::Stepwise) => {
            "\n## Approach\nWork through the task step by step, numbering each step before the final answer.\n"
        }
        ComponentRef::Reasoning(ReasoningComponent::Branching) => {
            "\n## Approach\nSketch at least two alternative approaches, compare them, then commit to the stronger one.\n"
        }
        ComponentRef::Output(OutputComponent::FreeText) => "",
        ComponentRef::Output(OutputComponent::Structured) => {
            "\n## Output format\nRespond in clearly titled sections.\n"
        }
    }
}

/// Maps tasks to initial prompts
pub struct PromptFunctor {
    handlebars: Handlebars<'static>,
}

impl Default for PromptFunctor {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptFunctor {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        // Template is embedded; registration cannot fail
        handlebars
            .register_template_string("base", BASE_TEMPLATE)
            .unwrap_or_else(|e| unreachable!("embedded template is valid: {e}"));
        Self { handlebars }
    }

    /// Classify a task into a complexity tier
    ///
    /// An explicit hint wins. Otherwise a heuristic over description length,
    /// signal keywords, and constraint count decides, deterministically.
    pub fn classify(&self, task: &Task) -> Result<Complexity, ClassifyError> {
        let description = task.description().trim();
        if description.is_empty() {
            return Err(ClassifyError::EmptyDescription);
        }
        if !description.chars().any(|c| c.is_alphanumeric()) {
            return Err(ClassifyError::Unparseable(description.to_string()));
        }

        if let Some(hint) = task.complexity_hint() {
            debug!(%hint, "PromptFunctor::classify: using explicit hint");
            return Ok(hint);
        }

        let words = description.split_whitespace().count();
        let mut tier = match words {
            0..8 => Complexity::Trivial,
            8..20 => Complexity::Simple,
            20..50 => Complexity::Moderate,
            50..120 => Complexity::Complex,
            _ => Complexity::Epic,
        };

        let lowered = description.to_lowercase();
        if COMPLEXITY_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            tier = bump(tier);
        }
        if task.constraints().len() >= 3 {
            tier = bump(tier);
        }

        debug!(%tier, words, "PromptFunctor::classify: heuristic result");
        Ok(tier)
    }

    /// Strategy selected for a tier
    pub fn strategy_for(tier: Complexity) -> Strategy {
        match tier {
            Complexity::Trivial | Complexity::Simple => Strategy::Direct,
            Complexity::Moderate => Strategy::ExampleAugmented,
            Complexity::Complex => Strategy::StepwiseReasoning,
            Complexity::Epic => Strategy::Branching,
        }
    }

    /// Components assembled for a strategy, in assembly order
    pub fn components_for(strategy: Strategy) -> Vec<ComponentRef> {
        match strategy {
            Strategy::Direct => vec![
                ComponentRef::Context(ContextComponent::Minimal),
                ComponentRef::Reasoning(ReasoningComponent::Direct),
                ComponentRef::Output(OutputComponent::FreeText),
            ],
            Strategy::ExampleAugmented => vec![
                ComponentRef::Context(ContextComponent::ExampleRich),
                ComponentRef::Reasoning(ReasoningComponent::Direct),
                ComponentRef::Output(OutputComponent::Structured),
            ],
            Strategy::StepwiseReasoning => vec![
                ComponentRef::Context(ContextComponent::TaskFocused),
                ComponentRef::Reasoning(ReasoningComponent::Stepwise),
                ComponentRef::Output(OutputComponent::Structured),
            ],
            Strategy::Branching => vec![
                ComponentRef::Context(ContextComponent::TaskFocused),
                ComponentRef::Reasoning(ReasoningComponent::Branching),
                ComponentRef::Output(OutputComponent::Structured),
            ],
        }
    }

    /// Map a task to its initial prompt
    pub fn apply(&self, task: &Task) -> Result<Prompt, ClassifyError> {
        let tier = self.classify(task)?;
        let strategy = Self::strategy_for(tier);
        let components = Self::components_for(strategy);
        debug!(%tier, ?strategy, "PromptFunctor::apply: assembling");

        let mut text = self
            .handlebars
            .render("base", &json!({ "description": task.description().trim() }))
            .map_err(|e| ClassifyError::Unparseable(e.to_string()))?;

        for component in &components {
            text.push_str(snippet(*component));
        }

        for constraint in task.constraints() {
            let block = constraint_block(&text, constraint);
            text.push_str(&block);
        }

        Ok(Prompt::new(text, components))
    }

    /// Prompt-level counterpart of `Task::with_constraint`
    ///
    /// Satisfies `apply(task.with_constraint(c)) == lift_constraint(apply(task), c)`
    /// whenever `c` sorts after the task's existing constraints and adding it
    /// does not change the classification tier.
    pub fn lift_constraint(&self, prompt: &Prompt, constraint: &str) -> Prompt {
        let addition = constraint_block(prompt.text(), constraint);
        let mut text = prompt.text().to_string();
        text.push_str(&addition);
        Prompt::new(text, prompt.components().to_vec())
    }
}

/// One tier up, saturating at the top
fn bump(tier: Complexity) -> Complexity {
    match tier {
        Complexity::Trivial => Complexity::Simple,
        Complexity::Simple => Complexity::Moderate,
        Complexity::Moderate => Complexity::Complex,
        Complexity::Complex | Complexity::Epic => Complexity::Epic,
    }
}

/// The text to append for one more constraint, opening the section if needed
fn constraint_block(existing: &str, constraint: &str) -> String {
    if existing.contains("\n## Constraints\n") {
        format!("- {}\n", constraint)
    } else {
        format!("\n## Constraints\n- {}\n", constraint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_is_deterministic() {
        let functor = PromptFunctor::new();
        let task = Task::new("summarize the report").with_constraint("keep it short");

        let first = functor.apply(&task).unwrap();
        let second = functor.apply(&task).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_description_fails() {
        let functor = PromptFunctor::new();
        assert_eq!(
            functor.classify(&Task::new("   ")),
            Err(ClassifyError::EmptyDescription)
        );
    }

    #[test]
    fn test_unparseable_description_fails() {
        let functor = PromptFunctor::new();
        let result = functor.classify(&Task::new("!!! ???"));
        assert!(matches!(result, Err(ClassifyError::Unparseable(_))));
    }

    #[test]
    fn test_hint_overrides_heuristic() {
        let functor = PromptFunctor::new();
        let task = Task::new("short").with_hint(Complexity::Epic);
        assert_eq!(functor.classify(&task).unwrap(), Complexity::Epic);
    }

    #[test]
    fn test_keyword_bumps_tier() {
        let functor = PromptFunctor::new();
        let plain = Task::new("rename the variable");
        let loaded = Task::new("refactor the variable");

        assert_eq!(functor.classify(&plain).unwrap(), Complexity::Trivial);
        assert_eq!(functor.classify(&loaded).unwrap(), Complexity::Simple);
    }

    #[test]
    fn test_trivial_prompt_has_no_scaffolding() {
        let functor = PromptFunctor::new();
        let prompt = functor.apply(&Task::new("trivial task")).unwrap();

        assert!(!prompt.text().contains("step by step"));
        assert!(!prompt.text().contains("alternative approaches"));
        assert!(
            prompt
                .components()
                .contains(&ComponentRef::Reasoning(ReasoningComponent::Direct))
        );
    }

    #[test]
    fn test_epic_prompt_has_branching_scaffolding() {
        let functor = PromptFunctor::new();
        let prompt = functor
            .apply(&Task::new("build it").with_hint(Complexity::Epic))
            .unwrap();

        assert!(prompt.text().contains("alternative approaches"));
        assert!(
            prompt
                .components()
                .contains(&ComponentRef::Reasoning(ReasoningComponent::Branching))
        );
    }

    #[test]
    fn test_functor_identity_law() {
        let functor = PromptFunctor::new();
        let task = Task::new("summarize the report").with_hint(Complexity::Simple);
        let identity = |t: Task| t;

        assert_eq!(functor.apply(&identity(task.clone())).unwrap(), functor.apply(&task).unwrap());
    }

    #[test]
    fn test_functor_composition_law_via_constraint_lift() {
        let functor = PromptFunctor::new();
        // Fixed hint so constraints cannot flip the tier; constraint names in
        // sorted order so the lifted append matches the rendered order.
        let task = Task::new("summarize the report").with_hint(Complexity::Simple);
        let f = |t: Task| t.with_constraint("alpha: cite sources");
        let g = |t: Task| t.with_constraint("beta: keep it short");

        let composed = functor.apply(&g(f(task.clone()))).unwrap();
        let lifted = functor.lift_constraint(&functor.apply(&f(task)).unwrap(), "beta: keep it short");

        assert_eq!(composed, lifted);
    }
}

//! Prompt value type and the closed component registry
//!
//! Prompts are immutable: every transformation produces a new value. The
//! components a prompt was assembled from are recorded as [`ComponentRef`]s
//! drawn from a closed set of known variants, so composition expressions can
//! be validated without any free-text lookup.

use serde::{Deserialize, Serialize};

/// Context-style components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextComponent {
    /// Bare description, nothing else
    Minimal,
    /// Description plus explicit goal framing
    TaskFocused,
    /// Description plus worked examples
    ExampleRich,
}

/// Reasoning-mode components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasoningComponent {
    /// Answer directly, no scaffolding
    Direct,
    /// Step-by-step reasoning scaffold
    Stepwise,
    /// Explore alternative approaches before committing
    Branching,
}

/// Output-format components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputComponent {
    FreeText,
    Structured,
}

/// Reference into the closed component registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "category", content = "variant")]
pub enum ComponentRef {
    Context(ContextComponent),
    Reasoning(ReasoningComponent),
    Output(OutputComponent),
}

/// An immutable rendered prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    #[serde(rename = "template-text")]
    template_text: String,
    components: Vec<ComponentRef>,
}

impl Prompt {
    /// Create a prompt from rendered text and the components it used
    pub fn new(template_text: impl Into<String>, components: Vec<ComponentRef>) -> Self {
        Self {
            template_text: template_text.into(),
            components,
        }
    }

    pub fn text(&self) -> &str {
        &self.template_text
    }

    /// Components in assembly order
    pub fn components(&self) -> &[ComponentRef] {
        &self.components
    }

    /// Return a new prompt with a block appended to the text
    ///
    /// Components are carried over unchanged; the appended block is guidance,
    /// not a registry component.
    pub fn with_appended(&self, block: &str) -> Self {
        let mut template_text = self.template_text.clone();
        if !template_text.ends_with('\n') {
            template_text.push('\n');
        }
        template_text.push_str(block);
        Self {
            template_text,
            components: self.components.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_appended_is_non_mutating() {
        let prompt = Prompt::new("Do the thing.", vec![ComponentRef::Reasoning(ReasoningComponent::Direct)]);
        let extended = prompt.with_appended("Also do it well.");

        assert_eq!(prompt.text(), "Do the thing.");
        assert!(extended.text().ends_with("Also do it well."));
        assert_eq!(extended.components(), prompt.components());
    }

    #[test]
    fn test_component_ref_serializes_with_category_tag() {
        let component = ComponentRef::Context(ContextComponent::ExampleRich);
        let json = serde_json::to_value(&component).unwrap();
        assert_eq!(json["category"], "context");
        assert_eq!(json["variant"], "example-rich");
    }
}

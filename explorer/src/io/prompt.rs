//! Prompt rendering for the decision, reflection and mode-classification calls.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::action::{ActionCommand, InteractionMode};
use crate::core::state::AgentMode;
use crate::core::types::{ElementList, UiElement};

const TASK_TEMPLATE: &str = include_str!("prompts/task.md");
const EXPLORE_TEMPLATE: &str = include_str!("prompts/explore.md");
const GRID_TEMPLATE: &str = include_str!("prompts/grid.md");
const REFLECT_TEMPLATE: &str = include_str!("prompts/reflect.md");
const CLASSIFY_TEMPLATE: &str = include_str!("prompts/classify.md");

/// Shown in place of documentation lines when nothing on screen has docs yet.
pub const NO_DOCUMENTATION: &str = "No documentation available for elements on this screen.";

/// Everything the reflection prompt needs about the action just executed.
#[derive(Debug, Clone)]
pub struct ReflectInputs<'a> {
    pub mode: AgentMode,
    pub description: &'a str,
    pub action_type: &'a str,
    pub element_details: &'a str,
    pub last_summary: &'a str,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("task", TASK_TEMPLATE)
            .expect("task template should be valid");
        env.add_template("explore", EXPLORE_TEMPLATE)
            .expect("explore template should be valid");
        env.add_template("grid", GRID_TEMPLATE)
            .expect("grid template should be valid");
        env.add_template("reflect", REFLECT_TEMPLATE)
            .expect("reflect template should be valid");
        env.add_template("classify", CLASSIFY_TEMPLATE)
            .expect("classify template should be valid");
        Self { env }
    }

    pub fn classify(&self, description: &str) -> Result<String> {
        self.render("classify", context! { description => description.trim() })
    }

    /// Decision prompt for one round. Grid interaction overrides the mode's template.
    pub fn decide(
        &self,
        mode: AgentMode,
        interaction: InteractionMode,
        description: &str,
        last_summary: &str,
        docs: &str,
    ) -> Result<String> {
        let name = match (interaction, mode) {
            (InteractionMode::Grid, _) => "grid",
            (InteractionMode::Element, AgentMode::Task) => "task",
            (InteractionMode::Element, AgentMode::Explore) => "explore",
        };
        self.render(
            name,
            context! {
                mode => mode.as_str(),
                description => description.trim(),
                last_summary => last_summary.trim(),
                docs => docs.trim_end(),
            },
        )
    }

    pub fn reflect(&self, input: &ReflectInputs<'_>) -> Result<String> {
        self.render(
            "reflect",
            context! {
                mode => input.mode.as_str(),
                description => input.description.trim(),
                action_type => input.action_type,
                element_details => input.element_details,
                last_summary => input.last_summary.trim(),
            },
        )
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        template
            .render(ctx)
            .with_context(|| format!("render {name} prompt"))
    }
}

/// One line per labeled element that has stored documentation.
pub fn documentation_context<F>(elements: &ElementList, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let lines: String = elements
        .labeled()
        .filter_map(|(label, element)| {
            lookup(&element.uid)
                .map(|doc| format!("Element {label} (UID: {}): {}\n", element.uid, doc.trim()))
        })
        .collect();
    if lines.is_empty() {
        NO_DOCUMENTATION.to_string()
    } else {
        lines
    }
}

/// How the reflection prompt describes what the action touched.
pub fn element_details(command: &ActionCommand, target: Option<(usize, &UiElement)>) -> String {
    match (target, command) {
        (Some((label, element)), _) => format!("Element {label} (UID: {})", element.uid),
        (None, ActionCommand::TypeGlobal { .. }) => "Text input via type_global".to_string(),
        (None, other) => format!("Global action ({})", other.name()),
    }
}

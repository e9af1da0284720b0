use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

use super::TemplateError;

/// Renders prompt templates with `{{ field }}` interpolation, dotted and
/// bracket access into nested values, and the `tojson` filter.
pub struct PromptComposer {
    env: Environment<'static>,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptComposer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        // Undefined variables are errors, not silently empty strings
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }

    pub fn compose<S: Serialize>(&self, template: &str, context: S) -> Result<String, TemplateError> {
        self.env
            .render_str(template, context)
            .map_err(TemplateError::Render)
    }
}

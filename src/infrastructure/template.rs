//! Template rendering applied to job documents before YAML parsing

use crate::jobs::{JobError, Variables};
use minijinja::{Environment, UndefinedBehavior};
use serde::{Deserialize, Serialize};

/// Renders document text against a variable context
pub trait TemplateRenderer {
    /// Renders `source`
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Template`] if the template is invalid.
    fn render(&self, source: &str, context: &Variables) -> Result<String, JobError>;
}

/// Jinja renderer; undefined variables render as empty strings
#[derive(Debug)]
pub struct JinjaRenderer {
    env: Environment<'static>,
}

impl JinjaRenderer {
    /// Creates a renderer with lenient undefined handling
    #[must_use]
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Lenient);
        env.set_keep_trailing_newline(true);
        Self { env }
    }
}

impl Default for JinjaRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer for JinjaRenderer {
    fn render(&self, source: &str, context: &Variables) -> Result<String, JobError> {
        let rendered = self.env.render_str(source, context)?;
        tracing::debug!(bytes = rendered.len(), "Rendered job template");
        Ok(rendered)
    }
}

/// Leaves the text untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct VerbatimRenderer;

impl TemplateRenderer for VerbatimRenderer {
    fn render(&self, source: &str, _context: &Variables) -> Result<String, JobError> {
        Ok(source.to_string())
    }
}

/// Template engine selected in the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TemplateEngine {
    /// Jinja syntax (`{{ name }}`)
    #[default]
    #[serde(rename = "jinja", alias = "jinja2")]
    Jinja,
    /// No templating
    #[serde(rename = "none", alias = "verbatim")]
    Verbatim,
}

impl TemplateEngine {
    /// Builds the renderer for this engine
    #[must_use]
    pub fn renderer(self) -> Box<dyn TemplateRenderer> {
        match self {
            Self::Jinja => Box::new(JinjaRenderer::new()),
            Self::Verbatim => Box::new(VerbatimRenderer),
        }
    }
}

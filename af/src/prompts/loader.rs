//! Prompt Loader
//!
//! Loads prompt templates from the workspace override directory or falls back
//! to the embedded defaults.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;

/// Loads and renders prompt templates
pub struct PromptLoader {
    hbs: Handlebars<'static>,
    /// User override directory (`<workspace>/.agentflow/prompts/`)
    user_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Loader that checks `<workspace>/<project_dir>/prompts/` before the embedded set
    pub fn new(workspace: impl AsRef<Path>, project_dir: &str) -> Self {
        let user_dir = workspace.as_ref().join(project_dir).join("prompts");
        debug!(?user_dir, exists = user_dir.exists(), "PromptLoader::new: called");
        Self {
            hbs: Self::engine(),
            user_dir: Some(user_dir),
        }
    }

    /// Loader that only uses the embedded templates
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Self::engine(),
            user_dir: None,
        }
    }

    /// Embedded-only when there is no workspace
    pub fn for_workspace(workspace: Option<&Path>, project_dir: &str) -> Self {
        match workspace {
            Some(ws) => Self::new(ws, project_dir),
            None => Self::embedded_only(),
        }
    }

    fn engine() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        // Prompts are plain text, not HTML
        hbs.register_escape_fn(handlebars::no_escape);
        hbs
    }

    /// Load a template by name: user override first, then embedded
    pub fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        if let Some(user_dir) = &self.user_dir {
            let path = user_dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found in user override");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read user prompt {}: {}", path.display(), e));
            }
        }

        embedded::get_embedded(name)
            .map(str::to_string)
            .ok_or_else(|| eyre!("Prompt template not found: {}", name))
    }

    /// Render a template with any serializable context
    pub fn render<T: Serialize>(&self, template_name: &str, context: &T) -> Result<String> {
        debug!(%template_name, "PromptLoader::render: called");
        let template = self.load_template(template_name)?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_step_user_without_context() {
        let loader = PromptLoader::embedded_only();
        let out = loader
            .render("step-user", &json!({"description": "Add a flag", "expected_output": ""}))
            .unwrap();
        assert!(out.contains("Add a flag"));
        assert!(!out.contains("Expected output"));
    }

    #[test]
    fn test_render_does_not_html_escape() {
        let loader = PromptLoader::embedded_only();
        let out = loader
            .render(
                "step-user-context",
                &json!({"description": "x", "expected_output": "y", "context": "a < b && \"c\""}),
            )
            .unwrap();
        assert!(out.contains("a < b && \"c\""));
    }

    #[test]
    fn test_user_override_wins() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path().join(".agentflow").join("prompts");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("step-user.pmt"), "OVERRIDE {{description}}").unwrap();

        let loader = PromptLoader::new(temp.path(), ".agentflow");
        let out = loader.render("step-user", &json!({"description": "go"})).unwrap();
        assert_eq!(out, "OVERRIDE go");

        // Other templates still come from the embedded set
        assert!(loader.load_template("planner").is_ok());
    }

    #[test]
    fn test_unknown_template() {
        let loader = PromptLoader::embedded_only();
        assert!(loader.load_template("nonexistent-template").is_err());
    }
}

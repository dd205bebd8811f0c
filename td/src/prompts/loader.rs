//! Renders the per-phase system prompt from a template, resolved through
//! the same override chain as `Config::load`: explicit path -> project-local
//! `.agentd/prompts/` -> built-in embedded default.

use std::path::{Path, PathBuf};

use eyre::{eyre, Result};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::{debug, info};

use super::embedded;

/// One grounding file fetched during pre-planning, for the planning prompt.
#[derive(Debug, Clone, Serialize)]
pub struct GroundingFile {
    pub path: String,
    pub content: String,
}

/// One entry of the command-executor's environment table, for the planning
/// prompt's environment-selection context.
#[derive(Debug, Clone, Serialize)]
pub struct AvailableEnvironment {
    pub name: String,
    pub image: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrePlanningPromptContext {
    pub task_prompt: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub inherited_summary: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanningPromptContext {
    pub task_prompt: String,
    pub understanding: Option<String>,
    pub grounding_files: Vec<GroundingFile>,
    pub available_environments: Vec<AvailableEnvironment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPromptContext {
    pub goal: String,
    pub current_action: String,
    pub current_subtask: String,
    pub progress_summary: String,
    pub last_tool_result: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReflectionPromptContext {
    pub trigger_reason: String,
    pub last_action_result: String,
    pub plan_summary: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationPromptContext {
    pub task_prompt: String,
    pub plan_summary: String,
    pub round_number: u32,
    pub max_rounds: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentRepairPromptContext {
    pub failed_command: String,
    pub exit_code: i32,
    pub output: String,
    pub round_number: u32,
    pub max_rounds: u32,
}

/// Loads and renders phase prompt templates.
pub struct PromptLoader {
    hbs: Handlebars<'static>,
    override_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Resolve the override directory: explicit `config_path` if given and
    /// it exists, else `{project_root}/.agentd/prompts/` if present.
    pub fn new(project_root: impl AsRef<Path>, config_path: Option<&Path>) -> Self {
        let override_dir = config_path
            .map(Path::to_path_buf)
            .filter(|p| p.exists())
            .or_else(|| {
                let candidate = project_root.as_ref().join(".agentd/prompts");
                candidate.exists().then_some(candidate)
            });
        debug!(?override_dir, "PromptLoader::new: resolved override directory");
        Self {
            hbs: Handlebars::new(),
            override_dir,
        }
    }

    pub fn embedded_only() -> Self {
        Self {
            hbs: Handlebars::new(),
            override_dir: None,
        }
    }

    fn load_template(&self, name: &str) -> Result<String> {
        if let Some(ref dir) = self.override_dir {
            let path = dir.join(format!("{name}.pmt"));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: using override");
                return std::fs::read_to_string(&path).map_err(|e| eyre!("failed to read override prompt {}: {e}", path.display()));
            }
        }
        embedded::get_embedded(name)
            .map(str::to_string)
            .ok_or_else(|| eyre!("prompt template not found: {name}"))
    }

    fn render<T: Serialize>(&self, name: &str, context: &T) -> Result<String> {
        let template = self.load_template(name)?;
        info!(template = name, "PromptLoader::render: rendering");
        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("failed to render template {name}: {e}"))
    }

    pub fn pre_planning(&self, ctx: &PrePlanningPromptContext) -> Result<String> {
        self.render("pre_planning", ctx)
    }

    pub fn planning(&self, ctx: &PlanningPromptContext) -> Result<String> {
        self.render("planning", ctx)
    }

    pub fn execution(&self, ctx: &ExecutionPromptContext) -> Result<String> {
        self.render("execution", ctx)
    }

    pub fn reflection(&self, ctx: &ReflectionPromptContext) -> Result<String> {
        self.render("reflection", ctx)
    }

    pub fn verification(&self, ctx: &VerificationPromptContext) -> Result<String> {
        self.render("verification", ctx)
    }

    pub fn environment_repair(&self, ctx: &EnvironmentRepairPromptContext) -> Result<String> {
        self.render("environment_repair", ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planning_prompt_renders_environments_and_grounding() {
        let loader = PromptLoader::embedded_only();
        let ctx = PlanningPromptContext {
            task_prompt: "Add README".to_string(),
            understanding: Some("Create a README documenting setup".to_string()),
            grounding_files: vec![GroundingFile {
                path: "Cargo.toml".to_string(),
                content: "[package]\nname = \"x\"".to_string(),
            }],
            available_environments: vec![AvailableEnvironment {
                name: "rust".to_string(),
                image: "rust:1.80".to_string(),
            }],
        };
        let rendered = loader.planning(&ctx).unwrap();
        assert!(rendered.contains("Add README"));
        assert!(rendered.contains("Cargo.toml"));
        assert!(rendered.contains("rust:1.80"));
    }

    #[test]
    fn execution_prompt_omits_tool_result_section_when_none() {
        let loader = PromptLoader::embedded_only();
        let ctx = ExecutionPromptContext {
            goal: "Add README".to_string(),
            current_action: "text_editor.create".to_string(),
            current_subtask: "create_readme".to_string(),
            progress_summary: "0/1 actions".to_string(),
            last_tool_result: None,
        };
        let rendered = loader.execution(&ctx).unwrap();
        assert!(!rendered.contains("Result of the previous tool call"));
    }

    #[test]
    fn verification_prompt_shows_round_counter() {
        let loader = PromptLoader::embedded_only();
        let ctx = VerificationPromptContext {
            task_prompt: "Add README".to_string(),
            plan_summary: "1 subtask".to_string(),
            round_number: 1,
            max_rounds: 2,
        };
        let rendered = loader.verification(&ctx).unwrap();
        assert!(rendered.contains("1 of 2"));
    }

    #[test]
    fn unknown_template_errors() {
        let loader = PromptLoader::embedded_only();
        let result = loader.load_template("nonexistent");
        assert!(result.is_err());
    }
}

//! Per-phase prompt templates, rendered with Handlebars from a template
//! embedded in the binary plus an optional on-disk override.
//!
//! Resolution chain: explicit config path -> project-local
//! `.agentd/prompts/{name}.pmt` -> built-in embedded default.

pub mod embedded;
mod loader;

pub use loader::{
    AvailableEnvironment, EnvironmentRepairPromptContext, ExecutionPromptContext, GroundingFile, PlanningPromptContext,
    PrePlanningPromptContext, PromptLoader, ReflectionPromptContext, VerificationPromptContext,
};

//! run_command tool - execute a shell command inside the task's container

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Execute a shell command inside the task's container.
pub struct RunCommandTool;

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &'static str {
        "run_command"
    }

    fn description(&self) -> &'static str {
        "Execute a shell command inside the task's container workspace. Use for git, build tools, tests."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute"
                },
                "working_dir": {
                    "type": "string",
                    "description": "Working directory inside the container (default: /workspace/project)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "RunCommandTool::execute: called");
        let Some(command) = input["command"].as_str() else {
            return ToolResult::error("command is required");
        };
        let working_dir = input["working_dir"].as_str();

        let container_name = format!("coding-agent-exec-{}", ctx.task_uuid);
        match ctx.environment.execute_command(&container_name, command, working_dir).await {
            Ok(output) if output.exit_code == 0 => {
                let combined = if output.stderr.is_empty() {
                    output.stdout
                } else {
                    format!("{}\n\nSTDERR:\n{}", output.stdout, output.stderr)
                };
                ToolResult::success(combined)
            }
            Ok(output) => ToolResult::error(format!(
                "Exit code: {}\n{}\nSTDERR:\n{}",
                output.exit_code, output.stdout, output.stderr
            )),
            Err(e) => ToolResult::error(format!("Failed to execute command: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommandExecutorConfig;
    use crate::environment::EnvironmentManager;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_run_command_missing_command() {
        let env = Arc::new(EnvironmentManager::new(CommandExecutorConfig::default()));
        let ctx = ToolContext::new("task-1".to_string(), "/workspace/project".to_string(), env);
        let tool = RunCommandTool;

        let result = tool.execute(serde_json::json!({}), &ctx).await;
        assert!(result.is_error);
        assert!(result.content.contains("command is required"));
    }
}

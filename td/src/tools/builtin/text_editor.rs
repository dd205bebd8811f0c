//! text_editor tool - view/create/str_replace/insert/undo_edit against a
//! file inside the task's container, proxied through the environment
//! manager's in-container editor protocol.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::environment::EditorCommand;
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

/// File editing inside the task's container. `str_replace` requires a
/// preceding `view` of the same path (edit-after-read discipline) and an
/// exact, unique match.
pub struct TextEditorTool;

#[async_trait]
impl Tool for TextEditorTool {
    fn name(&self) -> &'static str {
        "text_editor"
    }

    fn description(&self) -> &'static str {
        "View and edit files in the task's container workspace. Commands: view, create, str_replace, insert, undo_edit."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "enum": ["view", "create", "str_replace", "insert", "undo_edit"]},
                "path": {"type": "string"},
                "view_range": {"type": "array", "items": {"type": "integer"}, "minItems": 2, "maxItems": 2},
                "file_text": {"type": "string"},
                "old_str": {"type": "string"},
                "new_str": {"type": "string"},
                "insert_line": {"type": "integer"}
            },
            "required": ["command", "path"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "TextEditorTool::execute: called");
        let Some(command) = input["command"].as_str() else {
            return ToolResult::error("command is required");
        };
        let Some(path) = input["path"].as_str() else {
            return ToolResult::error("path is required");
        };

        let resolved_path = match ctx.validate_path(path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let editor_command = match command {
            "view" => {
                ctx.track_read(path).await;
                let view_range = input["view_range"].as_array().and_then(|a| {
                    let start = a.first()?.as_u64()? as usize;
                    let end = a.get(1)?.as_u64()? as usize;
                    Some([start, end])
                });
                EditorCommand::View {
                    path: resolved_path,
                    view_range,
                }
            }
            "create" => {
                let Some(file_text) = input["file_text"].as_str() else {
                    return ToolResult::error("file_text is required for create");
                };
                EditorCommand::Create {
                    path: resolved_path,
                    file_text: file_text.to_string(),
                }
            }
            "str_replace" => {
                if !ctx.was_read(path).await {
                    return ToolResult::error(ToolError::EditWithoutRead { path: path.to_string() }.to_string());
                }
                let (Some(old_str), Some(new_str)) = (input["old_str"].as_str(), input["new_str"].as_str()) else {
                    return ToolResult::error("old_str and new_str are required for str_replace");
                };
                EditorCommand::StrReplace {
                    path: resolved_path,
                    old_str: old_str.to_string(),
                    new_str: new_str.to_string(),
                }
            }
            "insert" => {
                if !ctx.was_read(path).await {
                    return ToolResult::error(ToolError::EditWithoutRead { path: path.to_string() }.to_string());
                }
                let Some(insert_line) = input["insert_line"].as_u64() else {
                    return ToolResult::error("insert_line is required for insert");
                };
                let Some(new_str) = input["new_str"].as_str() else {
                    return ToolResult::error("new_str is required for insert");
                };
                EditorCommand::Insert {
                    path: resolved_path,
                    insert_line: insert_line as usize,
                    new_str: new_str.to_string(),
                }
            }
            "undo_edit" => EditorCommand::UndoEdit { path: resolved_path },
            other => return ToolResult::error(ToolError::UnknownTool { name: other.to_string() }.to_string()),
        };

        let container_name = format!("coding-agent-exec-{}", ctx.task_uuid);
        match ctx.environment.call_text_editor_tool(&container_name, editor_command).await {
            Ok(output) => ToolResult::success(output),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommandExecutorConfig;
    use crate::environment::EnvironmentManager;
    use std::sync::Arc;

    fn ctx() -> ToolContext {
        let env = Arc::new(EnvironmentManager::new(CommandExecutorConfig::default()));
        ToolContext::new("task-1".to_string(), "/workspace/project".to_string(), env)
    }

    #[tokio::test]
    async fn test_str_replace_without_view_is_rejected() {
        let ctx = ctx();
        let tool = TextEditorTool;
        let result = tool
            .execute(
                serde_json::json!({"command": "str_replace", "path": "a.txt", "old_str": "x", "new_str": "y"}),
                &ctx,
            )
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("view"));
    }

    #[tokio::test]
    async fn test_path_escape_is_rejected() {
        let ctx = ctx();
        let tool = TextEditorTool;
        let result = tool
            .execute(serde_json::json!({"command": "view", "path": "../../etc/passwd"}), &ctx)
            .await;
        assert!(result.is_error);
    }
}

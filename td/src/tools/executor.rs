//! ToolExecutor - registers and dispatches the execution-phase tool set.

use std::collections::HashMap;

use crate::llm::{ToolCall, ToolDefinition};

use super::builtin::{RunCommandTool, TextEditorTool};
use super::{Tool, ToolContext, ToolResult};

/// Which tool set a given LLM call is offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolProfile {
    /// Command executor + text editor, full read/write access.
    Full,
    /// Text editor `view` only, for verification/read-only phases.
    ReadOnly,
}

/// Manages the tool set available during execution.
pub struct ToolExecutor {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolExecutor {
    /// Create the standard executor: command-executor and text-editor tools.
    pub fn standard() -> Self {
        let mut tools: HashMap<String, Box<dyn Tool>> = HashMap::new();
        tools.insert("run_command".into(), Box::new(RunCommandTool));
        tools.insert("text_editor".into(), Box::new(TextEditorTool));
        Self { tools }
    }

    pub fn empty() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn add_tool(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Definitions filtered by the tool profile offered for this LLM call.
    pub fn definitions_for_profile(&self, profile: ToolProfile) -> Vec<ToolDefinition> {
        match profile {
            ToolProfile::Full => self.definitions(),
            ToolProfile::ReadOnly => self
                .tools
                .values()
                .filter(|t| t.name() == "text_editor")
                .map(|t| ToolDefinition {
                    name: t.name().to_string(),
                    description: t.description().to_string(),
                    input_schema: t.input_schema(),
                })
                .collect(),
        }
    }

    pub async fn execute(&self, tool_call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        match self.tools.get(&tool_call.name) {
            Some(tool) => tool.execute(tool_call.input.clone(), ctx).await,
            None => ToolResult::error(format!("Unknown tool: {}", tool_call.name)),
        }
    }

    /// Execute every call in order, timing each one individually.
    pub async fn execute_all(&self, tool_calls: &[ToolCall], ctx: &ToolContext) -> Vec<(String, ToolResult, u64)> {
        let mut results = Vec::with_capacity(tool_calls.len());
        for call in tool_calls {
            let started = std::time::Instant::now();
            let result = self.execute(call, ctx).await;
            results.push((call.id.clone(), result, started.elapsed().as_millis() as u64));
        }
        results
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_executor_has_expected_tools() {
        let executor = ToolExecutor::standard();
        assert!(executor.has_tool("run_command"));
        assert!(executor.has_tool("text_editor"));
        assert_eq!(executor.tool_names().len(), 2);
    }

    #[test]
    fn test_read_only_profile_excludes_run_command() {
        let executor = ToolExecutor::standard();
        let defs = executor.definitions_for_profile(ToolProfile::ReadOnly);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "text_editor");
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let executor = ToolExecutor::standard();
        let env = std::sync::Arc::new(crate::environment::EnvironmentManager::new(
            crate::config::CommandExecutorConfig::default(),
        ));
        let ctx = ToolContext::new("task-1".to_string(), "/workspace/project".to_string(), env);

        let call = ToolCall {
            id: "call_1".to_string(),
            name: "unknown_tool".to_string(),
            input: serde_json::json!({}),
        };

        let result = executor.execute(&call, &ctx).await;
        assert!(result.is_error);
        assert!(result.content.contains("Unknown tool"));
    }
}

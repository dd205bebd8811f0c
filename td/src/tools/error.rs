//! Tool error types

use thiserror::Error;

/// Errors that can occur during tool execution
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Path {path} escapes workspace {workspace}")]
    SandboxViolation { path: String, workspace: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Must view file before editing: {path}")]
    EditWithoutRead { path: String },

    #[error("Command timed out after {timeout_secs}s")]
    CommandTimeout { timeout_secs: u64 },

    #[error("Tool not found: {name}")]
    UnknownTool { name: String },

    #[error("Environment error: {0}")]
    Environment(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("String pattern '{pattern}' not found in file")]
    PatternNotFound { pattern: String },

    #[error("String pattern found {count} times, expected 1")]
    PatternNotUnique { count: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_violation_message() {
        let err = ToolError::SandboxViolation {
            path: "/etc/passwd".to_string(),
            workspace: "/workspace/project".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/etc/passwd"));
        assert!(msg.contains("/workspace/project"));
    }

    #[test]
    fn test_pattern_not_unique_message() {
        let err = ToolError::PatternNotUnique { count: 5 };
        let msg = err.to_string();
        assert!(msg.contains('5'));
    }
}

//! ToolContext - execution context for tools, scoped to one task's container.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::ToolError;
use crate::environment::EnvironmentManager;

/// Execution context for tools - scoped to a single task's container.
///
/// Unlike a local-filesystem sandbox, path containment here is checked
/// against the in-container workspace path (`/workspace/project` by
/// default); actual command/file operations are proxied to the container
/// through `environment`.
#[derive(Clone)]
pub struct ToolContext {
    pub task_uuid: String,
    pub workspace_dir: String,
    pub environment: Arc<EnvironmentManager>,
    read_files: Arc<Mutex<HashSet<String>>>,
}

impl ToolContext {
    pub fn new(task_uuid: String, workspace_dir: String, environment: Arc<EnvironmentManager>) -> Self {
        Self {
            task_uuid,
            workspace_dir,
            environment,
            read_files: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub async fn track_read(&self, path: &str) {
        let mut read_files = self.read_files.lock().await;
        read_files.insert(self.normalize_path(path));
    }

    pub async fn was_read(&self, path: &str) -> bool {
        let read_files = self.read_files.lock().await;
        read_files.contains(&self.normalize_path(path))
    }

    pub async fn clear_reads(&self) {
        self.read_files.lock().await.clear();
    }

    fn normalize_path(&self, path: &str) -> String {
        if path.starts_with('/') {
            path.to_string()
        } else {
            format!("{}/{}", self.workspace_dir.trim_end_matches('/'), path)
        }
    }

    /// Validate a path stays within the container workspace. Purely
    /// lexical - there is no local filesystem to canonicalize against.
    pub fn validate_path(&self, path: &str) -> Result<String, ToolError> {
        let normalized = self.normalize_path(path);
        let mut segments: Vec<&str> = Vec::new();
        for part in normalized.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(ToolError::SandboxViolation {
                            path: path.to_string(),
                            workspace: self.workspace_dir.clone(),
                        });
                    }
                }
                seg => segments.push(seg),
            }
        }
        let resolved = format!("/{}", segments.join("/"));
        if resolved.starts_with(self.workspace_dir.trim_end_matches('/')) {
            Ok(resolved)
        } else {
            Err(ToolError::SandboxViolation {
                path: path.to_string(),
                workspace: self.workspace_dir.clone(),
            })
        }
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("task_uuid", &self.task_uuid)
            .field("workspace_dir", &self.workspace_dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommandExecutorConfig;

    fn ctx() -> ToolContext {
        let env = Arc::new(EnvironmentManager::new(CommandExecutorConfig::default()));
        ToolContext::new("task-1".to_string(), "/workspace/project".to_string(), env)
    }

    #[tokio::test]
    async fn test_track_and_check_read() {
        let ctx = ctx();
        assert!(!ctx.was_read("src/lib.rs").await);
        ctx.track_read("src/lib.rs").await;
        assert!(ctx.was_read("src/lib.rs").await);
    }

    #[tokio::test]
    async fn test_clear_reads() {
        let ctx = ctx();
        ctx.track_read("a.rs").await;
        ctx.track_read("b.rs").await;
        ctx.clear_reads().await;
        assert!(!ctx.was_read("a.rs").await);
    }

    #[test]
    fn test_validate_path_within_workspace() {
        let ctx = ctx();
        assert!(ctx.validate_path("test.txt").is_ok());
        assert_eq!(ctx.validate_path("test.txt").unwrap(), "/workspace/project/test.txt");
    }

    #[test]
    fn test_validate_path_escape_blocked() {
        let ctx = ctx();
        assert!(ctx.validate_path("../../etc/passwd").is_err());
        assert!(ctx.validate_path("/etc/passwd").is_err());
    }
}

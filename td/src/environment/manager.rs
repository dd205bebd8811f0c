//! Docker-backed environment manager: container lifecycle, scoped command
//! execution, and text-editor proxying - all by shelling out to the `docker`
//! CLI via `tokio::process::Command`, the same way worktree management shells
//! out to `git`.

use serde::Serialize;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::CommandExecutorConfig;

const CONTAINER_PREFIX: &str = "coding-agent-exec-";
const WORKSPACE_DIR: &str = "/workspace/project";

#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error("Unknown environment '{0}'")]
    UnknownEnvironment(String),

    #[error("Docker command failed: {0}")]
    DockerError(String),

    #[error("Container not ready: {0}")]
    NotReady(String),

    #[error("Command timed out after {0}s")]
    Timeout(u64),

    #[error("Text editor protocol error: {0}")]
    EditorProtocol(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Creating,
    Ready,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ContainerRecord {
    pub task_uuid: String,
    pub container_name: String,
    pub image: String,
    pub status: ContainerStatus,
}

impl ContainerRecord {
    fn name_for(task_uuid: &str) -> String {
        format!("{CONTAINER_PREFIX}{task_uuid}")
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// One in-container text-editor protocol command, mirroring `EditFileTool`'s
/// exact-match replace and must-view-before-edit discipline.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum EditorCommand {
    View { path: String, view_range: Option<[usize; 2]> },
    Create { path: String, file_text: String },
    StrReplace { path: String, old_str: String, new_str: String },
    Insert { path: String, insert_line: usize, new_str: String },
    UndoEdit { path: String },
}

pub struct EnvironmentManager {
    config: CommandExecutorConfig,
}

impl EnvironmentManager {
    pub fn new(config: CommandExecutorConfig) -> Self {
        Self { config }
    }

    fn resolve_image<'a>(&'a self, env_name: &str) -> &'a str {
        self.config
            .environments
            .get(env_name)
            .or_else(|| self.config.environments.get(&self.config.default_environment))
            .map(|s| s.as_str())
            .unwrap_or("ubuntu:24.04")
    }

    /// Provision a container for a task: remove any stale container of the
    /// same name, create and start a fresh one, clone the repo, and run
    /// dependency auto-install.
    pub async fn prepare(
        &self,
        task_uuid: &str,
        env_name: &str,
        clone_url: &str,
        branch: Option<&str>,
    ) -> Result<ContainerRecord, EnvironmentError> {
        let container_name = ContainerRecord::name_for(task_uuid);
        let image = self.resolve_image(env_name).to_string();
        debug!(%task_uuid, %container_name, %image, "EnvironmentManager::prepare: called");

        let _ = self.docker(&["rm", "-f", &container_name]).await;

        let memory = self.config.docker.memory_limit.clone();
        let cpus = self.config.docker.cpu_limit.to_string();
        let create_args = vec![
            "create".to_string(),
            "--name".to_string(),
            container_name.clone(),
            "--memory".to_string(),
            memory,
            "--cpus".to_string(),
            cpus,
            "-w".to_string(),
            WORKSPACE_DIR.to_string(),
            image.clone(),
            "sleep".to_string(),
            "infinity".to_string(),
        ];
        self.docker(&create_args.iter().map(String::as_str).collect::<Vec<_>>())
            .await?;
        self.docker(&["start", &container_name]).await?;
        info!(%container_name, %image, "container started");

        let depth = self.config.clone.depth.to_string();
        let mut clone_cmd = format!("mkdir -p {WORKSPACE_DIR} && git clone --depth {depth}");
        if let Some(branch) = branch {
            clone_cmd.push_str(&format!(" --branch {branch}"));
        }
        clone_cmd.push_str(&format!(" {clone_url} {WORKSPACE_DIR}"));

        let clone_result = self.execute_command(&container_name, &clone_cmd, None).await?;
        if clone_result.exit_code != 0 {
            warn!(%container_name, stderr = %clone_result.stderr, "clone failed");
            return Ok(ContainerRecord {
                task_uuid: task_uuid.to_string(),
                container_name,
                image,
                status: ContainerStatus::Failed,
            });
        }

        if self.config.clone.auto_install_deps {
            self.run_dependency_install(&container_name).await;
        }

        Ok(ContainerRecord {
            task_uuid: task_uuid.to_string(),
            container_name,
            image,
            status: ContainerStatus::Ready,
        })
    }

    async fn run_dependency_install(&self, container_name: &str) {
        let detect_and_install = "\
            if [ -f package.json ]; then npm install; \
            elif [ -f requirements.txt ]; then pip install -r requirements.txt; \
            elif [ -f go.mod ]; then go mod download; \
            elif ls *.yaml >/dev/null 2>&1; then true; \
            fi";
        let result = self.execute_command(container_name, detect_and_install, None).await;
        if let Ok(output) = result {
            if output.exit_code != 0 {
                debug!(%container_name, "dependency auto-install exited non-zero, continuing");
            }
        }
    }

    /// Run a shell command inside the container under a timeout.
    pub async fn execute_command(
        &self,
        container_name: &str,
        cmd: &str,
        working_dir: Option<&str>,
    ) -> Result<CommandOutput, EnvironmentError> {
        let dir = working_dir.unwrap_or(WORKSPACE_DIR);
        let timeout_secs = self.config.execution.timeout_seconds;
        debug!(%container_name, %cmd, %dir, "EnvironmentManager::execute_command: called");

        let start = std::time::Instant::now();
        let fut = Command::new("docker")
            .args(["exec", "-w", dir, container_name, "sh", "-c", cmd])
            .output();

        let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), fut).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(EnvironmentError::DockerError(e.to_string())),
            Err(_) => {
                return Ok(CommandOutput {
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: format!("command timed out after {timeout_secs}s"),
                    duration_ms: start.elapsed().as_millis() as u64,
                });
            }
        };

        let max_output = self.config.execution.max_output_size;
        let stdout = truncate_tail(&String::from_utf8_lossy(&output.stdout), max_output);
        let stderr = truncate_tail(&String::from_utf8_lossy(&output.stderr), max_output);

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout,
            stderr,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Proxy a single editor command over `docker exec -i`'s stdin/stdout,
    /// using the same single-line JSON request/response shape as the local
    /// text-editor tool.
    pub async fn call_text_editor_tool(
        &self,
        container_name: &str,
        command: EditorCommand,
    ) -> Result<String, EnvironmentError> {
        let request = serde_json::to_string(&command).map_err(|e| EnvironmentError::EditorProtocol(e.to_string()))?;
        let encoded = format!("echo {} | agentd-text-editor", shell_quote(&request));
        let output = self.execute_command(container_name, &encoded, None).await?;
        if output.exit_code != 0 {
            return Err(EnvironmentError::EditorProtocol(output.stderr));
        }
        Ok(output.stdout)
    }

    /// Stop and remove a task's container, retrying up to 3 times.
    pub async fn cleanup(&self, task_uuid: &str) -> Result<(), EnvironmentError> {
        let container_name = ContainerRecord::name_for(task_uuid);
        debug!(%container_name, "EnvironmentManager::cleanup: called");

        let mut last_err = None;
        for attempt in 1..=3 {
            match self.docker(&["rm", "-f", &container_name]).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    warn!(%container_name, attempt, "cleanup attempt failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(EnvironmentError::DockerError("unknown cleanup failure".to_string())))
    }

    /// Remove containers older than `stale_threshold_hours`. Idempotent.
    pub async fn cleanup_stale_containers(&self) -> Result<usize, EnvironmentError> {
        let output = self
            .docker(&[
                "ps",
                "-a",
                "--filter",
                &format!("name={CONTAINER_PREFIX}"),
                "--format",
                "{{.Names}}\t{{.CreatedAt}}",
            ])
            .await?;

        let threshold = chrono::Duration::hours(self.config.cleanup.stale_threshold_hours as i64);
        let now = chrono::Utc::now();
        let mut removed = 0;

        for line in output.lines() {
            let Some((name, created)) = line.split_once('\t') else { continue };
            let Ok(created_at) = chrono::DateTime::parse_from_str(created.trim(), "%Y-%m-%d %H:%M:%S %z %Z") else {
                continue;
            };
            if now.signed_duration_since(created_at) > threshold {
                if self.docker(&["rm", "-f", name]).await.is_ok() {
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }

    async fn docker(&self, args: &[&str]) -> Result<String, EnvironmentError> {
        let output = Command::new("docker")
            .args(args)
            .output()
            .await
            .map_err(|e| EnvironmentError::DockerError(e.to_string()))?;

        if !output.status.success() {
            return Err(EnvironmentError::DockerError(String::from_utf8_lossy(&output.stderr).to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

fn truncate_tail(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let min_start = s.len() - max_bytes;
    let start = (min_start..=s.len()).find(|&i| s.is_char_boundary(i)).unwrap_or(s.len());
    format!("...[truncated]\n{}", &s[start..])
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_image_falls_back_to_default_environment() {
        let manager = EnvironmentManager::new(CommandExecutorConfig::default());
        assert_eq!(manager.resolve_image("nonexistent"), manager.resolve_image("node"));
    }

    #[test]
    fn truncate_tail_keeps_size_bound() {
        let long = "x".repeat(100);
        let truncated = truncate_tail(&long, 10);
        assert!(truncated.len() < long.len());
        assert!(truncated.ends_with(&"x".repeat(10)));
    }

    #[test]
    fn truncate_tail_passthrough_when_short() {
        assert_eq!(truncate_tail("short", 100), "short");
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }
}

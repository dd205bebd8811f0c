//! `TaskRecord` - the index row persisted for every task attempt.

use serde::{Deserialize, Serialize};
use taskstore::{IndexValue, Record};
use tracing::debug;

use super::TaskKey;

/// Lifecycle status of a task attempt, as stored in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
    Paused,
    Stopped,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Running => {
                debug!("TaskStatus::Display: running");
                "running"
            }
            TaskStatus::Completed => {
                debug!("TaskStatus::Display: completed");
                "completed"
            }
            TaskStatus::Failed => {
                debug!("TaskStatus::Display: failed");
                "failed"
            }
            TaskStatus::Paused => {
                debug!("TaskStatus::Display: paused");
                "paused"
            }
            TaskStatus::Stopped => {
                debug!("TaskStatus::Display: stopped");
                "stopped"
            }
        };
        write!(f, "{s}")
    }
}

impl TaskStatus {
    /// Whether this status is terminal (task attempt is over, one way or another).
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Stopped)
    }

    /// The directory name this status's task lives under.
    pub fn status_dir(self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Stopped => "completed",
        }
    }
}

/// The persisted index row for one task attempt. `uuid` is the primary key;
/// `key_hash` is what the inheritance resolver and dedup logic query on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub uuid: String,
    pub key_hash: String,
    pub task_source: String,
    pub task_type: String,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub project_id: Option<u64>,
    pub number: Option<u64>,
    pub status: TaskStatus,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub process_id: u32,
    pub hostname: String,
    pub llm_provider: String,
    pub model: String,
    pub context_length: usize,
    #[serde(default)]
    pub llm_call_count: u64,
    #[serde(default)]
    pub tool_call_count: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub compression_count: u64,
    pub error_message: Option<String>,
    pub requester: String,
}

impl TaskRecord {
    pub fn new(uuid: String, key: &TaskKey, requester: String, llm_provider: String, model: String, context_length: usize) -> Self {
        let (owner, repo, project_id, number) = match key {
            TaskKey::GithubIssue { owner, repo, number } | TaskKey::GithubPullRequest { owner, repo, number } => {
                (Some(owner.clone()), Some(repo.clone()), None, Some(*number))
            }
            TaskKey::GitlabIssue { project_id, iid } | TaskKey::GitlabMergeRequest { project_id, iid } => {
                (None, None, Some(*project_id), Some(*iid))
            }
        };

        Self {
            uuid,
            key_hash: key.key_hash(),
            task_source: key.task_source().to_string(),
            task_type: key.task_type().to_string(),
            owner,
            repo,
            project_id,
            number,
            status: TaskStatus::Running,
            created_at: taskstore::now_ms(),
            started_at: Some(taskstore::now_ms()),
            completed_at: None,
            process_id: std::process::id(),
            hostname: hostname(),
            llm_provider,
            model,
            context_length,
            llm_call_count: 0,
            tool_call_count: 0,
            total_tokens: 0,
            compression_count: 0,
            error_message: None,
            requester,
        }
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| {
            std::process::Command::new("hostname")
                .output()
                .ok()
                .and_then(|o| String::from_utf8(o.stdout).ok())
                .map(|s| s.trim().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

impl Record for TaskRecord {
    fn id(&self) -> &str {
        &self.uuid
    }

    fn updated_at(&self) -> i64 {
        self.completed_at.or(self.started_at).unwrap_or(self.created_at)
    }

    fn collection_name() -> &'static str {
        "tasks"
    }

    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
        vec![
            ("status", self.status.to_string().into()),
            ("key_hash", self.key_hash.clone().into()),
            ("requester", self.requester.clone().into()),
            ("created_at", self.created_at.into()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_defaults_to_running() {
        let key = TaskKey::GithubIssue {
            owner: "acme".into(),
            repo: "widgets".into(),
            number: 1,
        };
        let record = TaskRecord::new("u1".into(), &key, "alice".into(), "anthropic".into(), "claude".into(), 200_000);
        assert_eq!(record.status, TaskStatus::Running);
        assert_eq!(record.key_hash, key.key_hash());
        assert_eq!(record.owner.as_deref(), Some("acme"));
    }

    #[test]
    fn completed_and_failed_and_stopped_all_share_the_completed_dir() {
        assert_eq!(TaskStatus::Completed.status_dir(), "completed");
        assert_eq!(TaskStatus::Failed.status_dir(), "completed");
        assert_eq!(TaskStatus::Stopped.status_dir(), "completed");
        assert_eq!(TaskStatus::Paused.status_dir(), "paused");
        assert_eq!(TaskStatus::Running.status_dir(), "running");
    }

    #[test]
    fn only_terminal_statuses_report_terminal() {
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Paused.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Stopped.is_terminal());
    }
}

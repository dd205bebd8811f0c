//! `TaskKey` - the platform-normalized identity of a tracker work item.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Which tracker platform (and item kind) a `TaskKey` refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum TaskKey {
    GithubIssue { owner: String, repo: String, number: u64 },
    GithubPullRequest { owner: String, repo: String, number: u64 },
    GitlabIssue { project_id: u64, iid: u64 },
    GitlabMergeRequest { project_id: u64, iid: u64 },
}

impl TaskKey {
    /// Deterministic canonical string form used for deduplication and
    /// inheritance lookups.
    pub fn canonical(&self) -> String {
        match self {
            TaskKey::GithubIssue { owner, repo, number } => format!("github_issue:{owner}:{repo}:{number}"),
            TaskKey::GithubPullRequest { owner, repo, number } => {
                format!("github_pull_request:{owner}:{repo}:{number}")
            }
            TaskKey::GitlabIssue { project_id, iid } => format!("gitlab_issue:{project_id}:{iid}"),
            TaskKey::GitlabMergeRequest { project_id, iid } => format!("gitlab_merge_request:{project_id}:{iid}"),
        }
    }

    /// SHA-256 hash of the canonical form, used as the `key_hash` index
    /// column so equality checks never compare variable-shaped tuples.
    pub fn key_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn task_source(&self) -> &'static str {
        match self {
            TaskKey::GithubIssue { .. } | TaskKey::GithubPullRequest { .. } => "github",
            TaskKey::GitlabIssue { .. } | TaskKey::GitlabMergeRequest { .. } => "gitlab",
        }
    }

    pub fn task_type(&self) -> &'static str {
        match self {
            TaskKey::GithubIssue { .. } => "issue",
            TaskKey::GithubPullRequest { .. } => "pull_request",
            TaskKey::GitlabIssue { .. } => "issue",
            TaskKey::GitlabMergeRequest { .. } => "merge_request",
        }
    }
}

impl std::fmt::Display for TaskKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

//! Tracker client capability: the `TrackerTask` trait every tracker variant
//! (GitHub, GitLab) implements, plus `TaskKey`-based dispatch.
//!
//! The HTTP clients behind this trait are external collaborators, not the
//! object of study here: the implementations below are minimal and
//! `reqwest`-direct, exercised in tests via `MockTrackerTask`, and are not
//! expected to be feature-complete against either platform's full API.

mod github;
mod gitlab;

pub use github::{list_trigger_items as list_github_trigger_items, GithubTracker};
pub use gitlab::{list_trigger_items as list_gitlab_trigger_items, GitlabTracker};

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::TaskKey;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response shape: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone)]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub body: String,
    pub created_at: i64,
}

/// Capability every tracker item (issue, PR, MR) provides to the coordinator.
#[async_trait]
pub trait TrackerTask: Send + Sync {
    fn key(&self) -> &TaskKey;

    /// Append a new comment; returns its id.
    async fn comment(&self, text: &str) -> Result<String, TrackerError>;

    /// Replace an existing comment's body.
    async fn update_comment(&self, id: &str, text: &str) -> Result<(), TrackerError>;

    async fn get_comments(&self) -> Result<Vec<Comment>, TrackerError>;

    async fn get_assignees(&self) -> Result<Vec<String>, TrackerError>;

    /// Swap trigger label for in-progress label. Idempotent.
    async fn prepare(&self) -> Result<(), TrackerError>;

    async fn finish(&self) -> Result<(), TrackerError>;
    async fn finish_stopped(&self) -> Result<(), TrackerError>;
    async fn finish_paused(&self) -> Result<(), TrackerError>;
    async fn finish_failed(&self) -> Result<(), TrackerError>;

    /// Render the issue/PR/MR body plus comments as the initial user message.
    async fn get_prompt(&self) -> Result<String, TrackerError>;
}

/// Construct the right tracker client for a `TaskKey`.
pub fn from_task_key(key: TaskKey, api_token: String) -> Arc<dyn TrackerTask> {
    match key.task_source() {
        "github" => Arc::new(GithubTracker::new(key, api_token)),
        "gitlab" => Arc::new(GitlabTracker::new(key, api_token)),
        other => unreachable!("unknown task source: {other}"),
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// In-memory `TrackerTask` for coordinator/producer/consumer tests.
    pub struct MockTrackerTask {
        key: TaskKey,
        pub comments: Mutex<Vec<Comment>>,
        pub assignees: Mutex<Vec<String>>,
        pub prompt: String,
        pub finished_as: Mutex<Option<&'static str>>,
    }

    impl MockTrackerTask {
        pub fn new(key: TaskKey, prompt: impl Into<String>) -> Self {
            Self {
                key,
                comments: Mutex::new(vec![]),
                assignees: Mutex::new(vec!["bot".to_string()]),
                prompt: prompt.into(),
                finished_as: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl TrackerTask for MockTrackerTask {
        fn key(&self) -> &TaskKey {
            &self.key
        }

        async fn comment(&self, text: &str) -> Result<String, TrackerError> {
            let mut comments = self.comments.lock().unwrap();
            let id = format!("c{}", comments.len() + 1);
            comments.push(Comment {
                id: id.clone(),
                author: "bot".to_string(),
                body: text.to_string(),
                created_at: 0,
            });
            Ok(id)
        }

        async fn update_comment(&self, id: &str, text: &str) -> Result<(), TrackerError> {
            let mut comments = self.comments.lock().unwrap();
            if let Some(c) = comments.iter_mut().find(|c| c.id == id) {
                c.body = text.to_string();
            }
            Ok(())
        }

        async fn get_comments(&self) -> Result<Vec<Comment>, TrackerError> {
            Ok(self.comments.lock().unwrap().clone())
        }

        async fn get_assignees(&self) -> Result<Vec<String>, TrackerError> {
            Ok(self.assignees.lock().unwrap().clone())
        }

        async fn prepare(&self) -> Result<(), TrackerError> {
            Ok(())
        }

        async fn finish(&self) -> Result<(), TrackerError> {
            *self.finished_as.lock().unwrap() = Some("done");
            Ok(())
        }

        async fn finish_stopped(&self) -> Result<(), TrackerError> {
            *self.finished_as.lock().unwrap() = Some("stopped");
            Ok(())
        }

        async fn finish_paused(&self) -> Result<(), TrackerError> {
            *self.finished_as.lock().unwrap() = Some("paused");
            Ok(())
        }

        async fn finish_failed(&self) -> Result<(), TrackerError> {
            *self.finished_as.lock().unwrap() = Some("failed");
            Ok(())
        }

        async fn get_prompt(&self) -> Result<String, TrackerError> {
            Ok(self.prompt.clone())
        }
    }

    #[tokio::test]
    async fn mock_tracks_finish_state() {
        let key = TaskKey::GithubIssue {
            owner: "acme".into(),
            repo: "widgets".into(),
            number: 1,
        };
        let mock = MockTrackerTask::new(key, "fix the thing");
        mock.finish_paused().await.unwrap();
        assert_eq!(*mock.finished_as.lock().unwrap(), Some("paused"));
    }
}

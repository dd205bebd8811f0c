//! Stop signal: the tracker bot's assignee has been removed. Polled on
//! each action boundary; transient API errors are tolerated by skipping
//! the check rather than treating them as a stop.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::tracker::TrackerTask;

pub struct StopWatcher {
    tracker: Arc<dyn TrackerTask>,
    bot_login: String,
}

impl StopWatcher {
    pub fn new(tracker: Arc<dyn TrackerTask>, bot_login: impl Into<String>) -> Self {
        Self {
            tracker,
            bot_login: bot_login.into(),
        }
    }

    /// `true` only when the assignee list was fetched successfully and no
    /// longer contains the bot. A fetch error returns `false` (tolerate and
    /// retry on the next boundary) rather than treating the task as stopped.
    pub async fn is_stopped(&self) -> bool {
        match self.tracker.get_assignees().await {
            Ok(assignees) => {
                let stopped = !assignees.iter().any(|a| a == &self.bot_login);
                if stopped {
                    debug!(bot = %self.bot_login, "StopWatcher::is_stopped: bot no longer assigned");
                }
                stopped
            }
            Err(e) => {
                warn!(error = %e, "StopWatcher::is_stopped: assignee fetch failed, tolerating");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskKey;
    use crate::tracker::mock::MockTrackerTask;

    fn key() -> TaskKey {
        TaskKey::GithubIssue {
            owner: "acme".into(),
            repo: "widgets".into(),
            number: 1,
        }
    }

    #[tokio::test]
    async fn bot_still_assigned_is_not_stopped() {
        let mock: Arc<dyn TrackerTask> = Arc::new(MockTrackerTask::new(key(), "prompt"));
        let watcher = StopWatcher::new(mock, "bot");
        assert!(!watcher.is_stopped().await);
    }

    #[tokio::test]
    async fn removed_assignee_is_stopped() {
        let mock = MockTrackerTask::new(key(), "prompt");
        *mock.assignees.lock().unwrap() = vec!["someone-else".to_string()];
        let watcher = StopWatcher::new(Arc::new(mock), "bot");
        assert!(watcher.is_stopped().await);
    }
}

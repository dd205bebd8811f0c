//! Polls configured tracker repos for trigger-labeled work and enqueues new
//! items. A `ProducerLock` file lock keeps at most one producer pass
//! running at a time, even across processes sharing the same base dir.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::{Envelope, ProducerLock, Queue};
use crate::config::{Config, TrackerRepo};
use crate::domain::TaskKey;
use crate::state::{StateManager, TaskQuery};

/// One pass over every configured repo: skip entirely if another producer
/// holds the lock, otherwise poll each repo/resource kind and enqueue any
/// trigger-labeled item that isn't already running or queued.
pub async fn run_once(config: &Config, base_dir: &std::path::Path, queue: &Queue, state: &StateManager) -> eyre::Result<usize> {
    let Some(_lock) = ProducerLock::try_acquire(base_dir)? else {
        debug!("producer: lock held by another pass, skipping");
        return Ok(0);
    };
    let token = config.tracker.api_token()?;
    let mut enqueued = 0usize;

    for repo in &config.tracker.repos {
        match list_repo_items(repo, &token).await {
            Ok(items) => {
                for (key, requester) in items {
                    if enqueue_if_new(&key, &requester, queue, state).await? {
                        enqueued += 1;
                    }
                }
            }
            Err(e) => warn!(source = %repo.source, project = %repo.project, error = %e, "producer: failed to list trigger items for repo"),
        }
    }
    info!(enqueued, "producer: pass complete");
    Ok(enqueued)
}

async fn list_repo_items(repo: &TrackerRepo, token: &str) -> eyre::Result<Vec<(TaskKey, String)>> {
    match repo.source.as_str() {
        "github" => {
            let (owner, name) = repo
                .project
                .split_once('/')
                .ok_or_else(|| eyre::eyre!("github repo '{}' must be 'owner/repo'", repo.project))?;
            let mut items = crate::tracker::list_github_trigger_items(owner, name, token).await?;
            if !repo.include_pull_requests {
                items.retain(|(key, _)| matches!(key, TaskKey::GithubIssue { .. }));
            }
            Ok(items)
        }
        "gitlab" => {
            let project_id: u64 = repo
                .project
                .parse()
                .map_err(|_| eyre::eyre!("gitlab project '{}' must be numeric", repo.project))?;
            let mut items = crate::tracker::list_gitlab_trigger_items(project_id, "issue", token).await?;
            if repo.include_pull_requests {
                items.extend(crate::tracker::list_gitlab_trigger_items(project_id, "merge_request", token).await?);
            }
            Ok(items)
        }
        other => Err(eyre::eyre!("unknown tracker source '{other}'")),
    }
}

/// Enqueue `key` unless a non-terminal attempt already exists for it.
async fn enqueue_if_new(key: &TaskKey, requester: &str, queue: &Queue, state: &StateManager) -> eyre::Result<bool> {
    let key_hash = key.key_hash();
    let existing = state
        .query(TaskQuery {
            key_hash: Some(key_hash.clone()),
            ..Default::default()
        })
        .await?;
    if existing.iter().any(|r| !r.status.is_terminal()) {
        debug!(%key_hash, "producer: item already has a non-terminal attempt, skipping");
        return Ok(false);
    }

    let uuid = Uuid::now_v7().to_string();
    let envelope = Envelope {
        task_key: key.clone(),
        uuid: uuid.clone(),
        requester: requester.to_string(),
        is_resumed: false,
    };
    queue.enqueue(&envelope)?;
    info!(%uuid, %key_hash, "producer: enqueued new item");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskRecord, TaskStatus};
    use tempfile::TempDir;

    fn key(number: u64) -> TaskKey {
        TaskKey::GithubIssue {
            owner: "acme".into(),
            repo: "widgets".into(),
            number,
        }
    }

    #[tokio::test]
    async fn enqueue_if_new_skips_when_already_running() {
        let dir = TempDir::new().unwrap();
        let queue = Queue::open(dir.path().join("tasks.db")).unwrap();
        let state = StateManager::spawn(dir.path().join("index")).unwrap();

        let mut record = TaskRecord::new("u1".into(), &key(1), "alice".into(), "anthropic".into(), "claude".into(), 200_000);
        record.status = TaskStatus::Running;
        state.create(record).await.unwrap();

        let enqueued = enqueue_if_new(&key(1), "alice", &queue, &state).await.unwrap();
        assert!(!enqueued);
    }

    #[tokio::test]
    async fn enqueue_if_new_accepts_fresh_item() {
        let dir = TempDir::new().unwrap();
        let queue = Queue::open(dir.path().join("tasks.db")).unwrap();
        let state = StateManager::spawn(dir.path().join("index")).unwrap();

        let enqueued = enqueue_if_new(&key(2), "bob", &queue, &state).await.unwrap();
        assert!(enqueued);
    }
}

//! Resolve a previous completed attempt at the same tracker item and seed
//! its final summary into a freshly created context.

use contextstore::ContextStore;
use eyre::Result;
use taskstore::{Filter, Store};
use tracing::{debug, info};

use crate::domain::{TaskRecord, TaskStatus};

/// A previous attempt eligible for context inheritance.
pub struct InheritanceCandidate {
    pub uuid: String,
    pub completed_at: i64,
    pub summary: String,
}

/// Query the index for the most recent completed attempt at `key_hash`
/// within `expiry_days`, and read its `final_summary.txt` if present.
///
/// Returns `None` when inheritance is switched off, no prior completed
/// attempt exists, the most recent one is older than `expiry_days`, or it
/// has no final summary on disk (e.g. it failed before reaching `complete`).
pub fn resolve_inheritance(
    store: &Store<TaskRecord>,
    base_dir: &std::path::Path,
    key_hash: &str,
    expiry_days: u32,
    now_ms: i64,
) -> Result<Option<InheritanceCandidate>> {
    // `Store::query` only ANDs filters, so the `status ∈ {completed, stopped}`
    // eligibility set is gathered as two queries and merged.
    let mut candidates = store.query(&[Filter::eq("key_hash", key_hash), Filter::eq("status", TaskStatus::Completed.to_string())])?;
    candidates.extend(store.query(&[Filter::eq("key_hash", key_hash), Filter::eq("status", TaskStatus::Stopped.to_string())])?);

    let cutoff = now_ms - (expiry_days as i64) * 24 * 60 * 60 * 1000;
    let Some(most_recent) = candidates.into_iter().filter(|r| r.completed_at.unwrap_or(0) >= cutoff).max_by_key(|r| r.completed_at.unwrap_or(0)) else {
        debug!(key_hash, "resolve_inheritance: no eligible prior attempt");
        return Ok(None);
    };

    let completed_dir = base_dir.join("completed").join(&most_recent.uuid);
    let Some(summary) = ContextStore::read_final_summary(&completed_dir)? else {
        debug!(uuid = %most_recent.uuid, "resolve_inheritance: prior attempt has no final summary");
        return Ok(None);
    };

    info!(uuid = %most_recent.uuid, "resolve_inheritance: found inheritable prior attempt");
    Ok(Some(InheritanceCandidate {
        uuid: most_recent.uuid,
        completed_at: most_recent.completed_at.unwrap_or(0),
        summary,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskKey;
    use contextstore::TaskMetadata;
    use tempfile::TempDir;

    fn record(uuid: &str, key: &TaskKey, completed_at: i64) -> TaskRecord {
        let mut r = TaskRecord::new(uuid.to_string(), key, "alice".to_string(), "anthropic".to_string(), "claude".to_string(), 200_000);
        r.status = TaskStatus::Completed;
        r.completed_at = Some(completed_at);
        r
    }

    #[test]
    fn finds_recent_completed_attempt_with_summary() {
        let dir = TempDir::new().unwrap();
        let store: Store<TaskRecord> = Store::open(dir.path()).unwrap();
        let key = TaskKey::GithubIssue {
            owner: "acme".into(),
            repo: "widgets".into(),
            number: 1,
        };
        let rec = record("t1", &key, 1_000_000);
        store.insert(&rec).unwrap();

        let completed_dir = dir.path().join("completed").join("t1");
        let ctx = ContextStore::create(
            &completed_dir,
            TaskMetadata {
                task_uuid: "t1".to_string(),
                task_source: "github".to_string(),
                created_at: 0,
                llm_provider: "anthropic".to_string(),
                model: "claude".to_string(),
                context_length: 200_000,
                requester: "alice".to_string(),
                is_resumed: false,
            },
        )
        .unwrap();
        ctx.write_final_summary("previously fixed the README").unwrap();

        let found = resolve_inheritance(&store, dir.path(), &key.key_hash(), 90, 1_000_000 + 1_000).unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().summary, "previously fixed the README");
    }

    #[test]
    fn expired_attempt_is_not_inherited() {
        let dir = TempDir::new().unwrap();
        let store: Store<TaskRecord> = Store::open(dir.path()).unwrap();
        let key = TaskKey::GithubIssue {
            owner: "acme".into(),
            repo: "widgets".into(),
            number: 2,
        };
        let rec = record("t2", &key, 0);
        store.insert(&rec).unwrap();

        let ninety_one_days_ms = 91 * 24 * 60 * 60 * 1000;
        let found = resolve_inheritance(&store, dir.path(), &key.key_hash(), 90, ninety_one_days_ms).unwrap();
        assert!(found.is_none());
    }
}

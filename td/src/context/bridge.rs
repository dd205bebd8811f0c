//! `ContextBridge` - owns a task's `{base}/{status_dir}/{uuid}/` directory
//! and the `ContextStore` rooted there, plus the atomic rename on every
//! lifecycle transition (`running/` <-> `paused/` <-> `completed/`).

use std::fs;
use std::path::{Path, PathBuf};

use contextstore::{ChatMessage, ContextStore, TaskMetadata};
use eyre::{eyre, Context as _, Result};
use tracing::info;

/// Directory-transition-aware handle the coordinator holds for the
/// lifetime of one task attempt.
pub struct ContextBridge {
    base_dir: PathBuf,
    uuid: String,
    store: ContextStore,
}

impl ContextBridge {
    /// Create a brand-new `running/{uuid}/` context directory.
    pub fn create(base_dir: impl Into<PathBuf>, uuid: &str, metadata: TaskMetadata) -> Result<Self> {
        let base_dir = base_dir.into();
        let task_dir = base_dir.join("running").join(uuid);
        let store = ContextStore::create(&task_dir, metadata).context("failed to create context directory")?;
        Ok(Self {
            base_dir,
            uuid: uuid.to_string(),
            store,
        })
    }

    /// Re-take ownership of a task paused in `paused/{uuid}/`, renaming it
    /// back to `running/{uuid}/` before opening it.
    pub fn resume(base_dir: impl Into<PathBuf>, uuid: &str) -> Result<Self> {
        let base_dir = base_dir.into();
        let paused_dir = base_dir.join("paused").join(uuid);
        let running_dir = base_dir.join("running").join(uuid);
        if paused_dir.exists() {
            rename_dir(&paused_dir, &running_dir)?;
        } else if !running_dir.exists() {
            return Err(eyre!("no context directory for {uuid} under paused/ or running/"));
        }
        let store = ContextStore::open_existing(&running_dir).context("failed to reopen context directory")?;
        Ok(Self {
            base_dir,
            uuid: uuid.to_string(),
            store,
        })
    }

    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    pub fn current_messages(&self) -> Result<Vec<ChatMessage>> {
        self.store.current_messages()
    }

    /// `running/` -> `completed/`, leaving `status=completed` to the index.
    pub fn complete(&self, final_summary: &str) -> Result<()> {
        self.store.write_final_summary(final_summary)?;
        self.transition("running", "completed")
    }

    /// `running/` -> `completed/` with `status=failed` (the index row, not
    /// this directory move, records the distinction).
    pub fn fail(&self) -> Result<()> {
        self.transition("running", "completed")
    }

    /// `running/` -> `completed/` with `status=stopped`.
    pub fn stop(&self) -> Result<()> {
        self.transition("running", "completed")
    }

    /// `running/` -> `paused/`.
    pub fn pause(&self) -> Result<()> {
        self.transition("running", "paused")
    }

    fn transition(&self, from: &str, to: &str) -> Result<()> {
        let from_dir = self.base_dir.join(from).join(&self.uuid);
        let to_dir = self.base_dir.join(to).join(&self.uuid);
        rename_dir(&from_dir, &to_dir)?;
        info!(uuid = %self.uuid, from, to, "ContextBridge::transition: directory moved");
        Ok(())
    }
}

fn rename_dir(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).context("failed to create destination parent directory")?;
    }
    fs::rename(from, to).context(format!("failed to rename {} -> {}", from.display(), to.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn metadata(uuid: &str) -> TaskMetadata {
        TaskMetadata {
            task_uuid: uuid.to_string(),
            task_source: "github".to_string(),
            created_at: 0,
            llm_provider: "anthropic".to_string(),
            model: "claude".to_string(),
            context_length: 200_000,
            requester: "alice".to_string(),
            is_resumed: false,
        }
    }

    #[test]
    fn create_then_pause_then_resume_roundtrips() {
        let dir = TempDir::new().unwrap();
        let bridge = ContextBridge::create(dir.path(), "t1", metadata("t1")).unwrap();
        bridge.store().append_message("user", "hello", None).unwrap();
        bridge.pause().unwrap();

        assert!(dir.path().join("paused").join("t1").exists());
        assert!(!dir.path().join("running").join("t1").exists());

        let resumed = ContextBridge::resume(dir.path(), "t1").unwrap();
        assert!(dir.path().join("running").join("t1").exists());
        assert_eq!(resumed.current_messages().unwrap().len(), 1);
    }

    #[test]
    fn complete_writes_summary_and_moves_to_completed() {
        let dir = TempDir::new().unwrap();
        let bridge = ContextBridge::create(dir.path(), "t2", metadata("t2")).unwrap();
        bridge.complete("did the thing").unwrap();

        let summary_path = dir.path().join("completed").join("t2").join("final_summary.txt");
        assert_eq!(fs::read_to_string(summary_path).unwrap(), "did the thing");
    }
}

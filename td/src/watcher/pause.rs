//! Pause signal: existence of `{base}/pause_signal`. Not auto-deleted -
//! operator intervention is required before a resumed task actually runs.

use std::path::{Path, PathBuf};

use tracing::debug;

pub struct PauseWatcher {
    signal_path: PathBuf,
}

impl PauseWatcher {
    pub fn new(base_dir: impl AsRef<Path>, signal_file: &str) -> Self {
        Self {
            signal_path: base_dir.as_ref().join(signal_file),
        }
    }

    /// Advisory and idempotent: safe to call repeatedly at every action
    /// boundary.
    pub fn is_paused(&self) -> bool {
        let paused = self.signal_path.exists();
        if paused {
            debug!(path = %self.signal_path.display(), "PauseWatcher::is_paused: pause signal present");
        }
        paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn absent_signal_file_means_not_paused() {
        let dir = TempDir::new().unwrap();
        let watcher = PauseWatcher::new(dir.path(), "pause_signal");
        assert!(!watcher.is_paused());
    }

    #[test]
    fn present_signal_file_means_paused() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("pause_signal"), "").unwrap();
        let watcher = PauseWatcher::new(dir.path(), "pause_signal");
        assert!(watcher.is_paused());
    }
}

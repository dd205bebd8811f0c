//! Append-only `events.jsonl` file logger, one open writer per task, fed by
//! an `EventBus` subscription.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use super::bus::EventBus;
use super::types::{AgentEvent, EventLogEntry};

/// Writes events to `{base_dir}/events/{task_uuid}.jsonl`, independent of
/// which status directory the task's context currently lives under.
pub struct EventLogger {
    base_dir: PathBuf,
    writers: HashMap<String, BufWriter<File>>,
}

impl EventLogger {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        let base_dir = base_dir.as_ref().to_path_buf();
        debug!(?base_dir, "EventLogger::new: creating logger");
        Self {
            base_dir,
            writers: HashMap::new(),
        }
    }

    pub fn write_event(&mut self, event: &AgentEvent) -> eyre::Result<()> {
        let task_uuid = event.task_uuid();
        debug!(%task_uuid, event_type = event.event_type(), "EventLogger::write_event");

        let writer = if let Some(w) = self.writers.get_mut(task_uuid) {
            w
        } else {
            let events_dir = self.base_dir.join("events");
            fs::create_dir_all(&events_dir)?;
            let log_path = events_dir.join(format!("{task_uuid}.jsonl"));
            let file = OpenOptions::new().create(true).append(true).open(&log_path)?;
            self.writers.insert(task_uuid.to_string(), BufWriter::new(file));
            self.writers.get_mut(task_uuid).unwrap()
        };

        let entry = EventLogEntry::new(event.clone());
        writeln!(writer, "{}", serde_json::to_string(&entry)?)?;
        writer.flush()?;
        Ok(())
    }

    pub fn close_task(&mut self, task_uuid: &str) {
        if let Some(mut writer) = self.writers.remove(task_uuid) {
            let _ = writer.flush();
        }
    }

    /// Drain the bus until it closes, closing each task's writer on its
    /// terminal event.
    pub async fn run(mut self, event_bus: Arc<EventBus>) {
        debug!("EventLogger::run: starting");
        let mut rx = event_bus.subscribe();

        loop {
            match rx.recv().await {
                Ok(event) => {
                    let task_uuid = event.task_uuid().to_string();
                    let is_terminal = matches!(
                        event,
                        AgentEvent::TaskCompleted { .. } | AgentEvent::TaskFailed { .. } | AgentEvent::TaskStopped { .. }
                    );

                    if let Err(e) = self.write_event(&event) {
                        error!(%task_uuid, error = %e, "EventLogger: failed to write event");
                    }
                    if is_terminal {
                        self.close_task(&task_uuid);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "EventLogger: lagged behind, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("EventLogger: channel closed, shutting down");
                    break;
                }
            }
        }

        for (task_uuid, mut writer) in self.writers.drain() {
            debug!(%task_uuid, "EventLogger: flushing writer on shutdown");
            let _ = writer.flush();
        }
    }
}

pub fn read_task_events(base_dir: impl AsRef<Path>, task_uuid: &str) -> eyre::Result<Vec<EventLogEntry>> {
    let log_path = base_dir.as_ref().join("events").join(format!("{task_uuid}.jsonl"));
    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&log_path)?;
    let mut entries = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(line, error = %e, "read_task_events: failed to parse line"),
        }
    }
    Ok(entries)
}

pub fn spawn_event_logger(base_dir: impl AsRef<Path>, event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let logger = EventLogger::new(base_dir);
    tokio::spawn(logger.run(event_bus))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_then_read_roundtrips() {
        let dir = TempDir::new().unwrap();
        let mut logger = EventLogger::new(dir.path());
        logger
            .write_event(&AgentEvent::TaskStarted {
                task_uuid: "t1".to_string(),
                is_resumed: false,
            })
            .unwrap();
        logger.close_task("t1");

        let entries = read_task_events(dir.path(), "t1").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event.task_uuid(), "t1");
    }

    #[tokio::test]
    async fn run_persists_events_until_bus_drops() {
        let dir = TempDir::new().unwrap();
        let bus = Arc::new(EventBus::new(16));
        let handle = spawn_event_logger(dir.path(), bus.clone());

        bus.emit(AgentEvent::TaskStarted {
            task_uuid: "t2".to_string(),
            is_resumed: false,
        });
        bus.emit(AgentEvent::TaskCompleted { task_uuid: "t2".to_string() });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        drop(bus);
        let _ = tokio::time::timeout(std::time::Duration::from_secs(1), handle).await;

        let entries = read_task_events(dir.path(), "t2").unwrap();
        assert_eq!(entries.len(), 2);
    }
}

//! `queue` table: `uuid PK, envelope JSON, visible_at, delivered_at, acked_at`.
//!
//! `enqueue` is an INSERT. `get_with_signal_check` polls
//! `SELECT ... WHERE acked_at IS NULL AND visible_at <= now ORDER BY
//! visible_at LIMIT 1`, stamping `delivered_at` as an in-flight lease; a
//! message whose lease expires without an `ack` becomes visible again.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::BrokerError;
use crate::domain::TaskKey;

const DEFAULT_LEASE_SECONDS: i64 = 600;

/// Wire envelope carried through the queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub task_key: TaskKey,
    pub uuid: String,
    pub requester: String,
    pub is_resumed: bool,
}

pub struct Queue {
    conn: Mutex<Connection>,
    lease_seconds: i64,
}

impl Queue {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, BrokerError> {
        Self::open_with_lease(db_path, DEFAULT_LEASE_SECONDS)
    }

    pub fn open_with_lease(db_path: impl AsRef<Path>, lease_seconds: i64) -> Result<Self, BrokerError> {
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS queue (
                uuid TEXT PRIMARY KEY,
                envelope TEXT NOT NULL,
                visible_at INTEGER NOT NULL,
                delivered_at INTEGER,
                acked_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_queue_visible ON queue(acked_at, visible_at);",
        )?;
        debug!(lease_seconds, "Queue::open: ready");
        Ok(Self {
            conn: Mutex::new(conn),
            lease_seconds,
        })
    }

    pub fn enqueue(&self, envelope: &Envelope) -> Result<(), BrokerError> {
        let conn = self.conn.lock().unwrap();
        let json = serde_json::to_string(envelope)?;
        conn.execute(
            "INSERT INTO queue (uuid, envelope, visible_at, delivered_at, acked_at) VALUES (?1, ?2, ?3, NULL, NULL)
             ON CONFLICT(uuid) DO NOTHING",
            params![envelope.uuid, json, now_secs()],
        )?;
        info!(uuid = %envelope.uuid, "Queue::enqueue: accepted");
        Ok(())
    }

    /// Attempt one non-blocking dequeue: the next visible, unacked message,
    /// stamping `delivered_at` as a lease. `None` if nothing is ready.
    fn try_get(&self) -> Result<Option<Envelope>, BrokerError> {
        let conn = self.conn.lock().unwrap();
        let now = now_secs();
        let lease_cutoff = now - self.lease_seconds;

        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT uuid, envelope FROM queue
                 WHERE acked_at IS NULL
                   AND visible_at <= ?1
                   AND (delivered_at IS NULL OR delivered_at <= ?2)
                 ORDER BY visible_at ASC LIMIT 1",
                params![now, lease_cutoff],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok();

        let Some((uuid, envelope_json)) = row else {
            return Ok(None);
        };

        conn.execute("UPDATE queue SET delivered_at = ?1 WHERE uuid = ?2", params![now, uuid])?;
        let envelope: Envelope = serde_json::from_str(&envelope_json)?;
        debug!(%uuid, "Queue::try_get: delivered (lease stamped)");
        Ok(Some(envelope))
    }

    /// Blocks up to `timeout`, returning the next message or `None` on
    /// timeout; returns `None` immediately if `stop_signal` becomes true
    /// during the wait. Internal polling at `poll_interval` so the wait
    /// remains interruptible.
    pub async fn get_with_signal_check(
        &self,
        timeout: Duration,
        stop_signal: &Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> Result<Option<Envelope>, BrokerError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if stop_signal.load(Ordering::Relaxed) {
                return Ok(None);
            }
            if let Some(envelope) = self.try_get()? {
                return Ok(Some(envelope));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(poll_interval.min(deadline.saturating_duration_since(tokio::time::Instant::now()))).await;
        }
    }

    /// Acknowledge a message by uuid. Idempotent.
    pub fn ack(&self, uuid: &str) -> Result<(), BrokerError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("UPDATE queue SET acked_at = ?1 WHERE uuid = ?2 AND acked_at IS NULL", params![now_secs(), uuid])?;
        if changed == 0 {
            warn!(uuid, "Queue::ack: no unacked row found (already acked or unknown)");
        }
        Ok(())
    }
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn envelope(uuid: &str) -> Envelope {
        Envelope {
            task_key: TaskKey::GithubIssue {
                owner: "acme".into(),
                repo: "widgets".into(),
                number: 1,
            },
            uuid: uuid.to_string(),
            requester: "alice".to_string(),
            is_resumed: false,
        }
    }

    #[tokio::test]
    async fn enqueue_then_get_roundtrips() {
        let dir = TempDir::new().unwrap();
        let queue = Queue::open(dir.path().join("tasks.db")).unwrap();
        queue.enqueue(&envelope("t1")).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let got = queue
            .get_with_signal_check(Duration::from_secs(1), &stop, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(got, Some(envelope("t1")));
    }

    #[tokio::test]
    async fn stop_signal_short_circuits_wait() {
        let dir = TempDir::new().unwrap();
        let queue = Queue::open(dir.path().join("tasks.db")).unwrap();

        let stop = Arc::new(AtomicBool::new(true));
        let got = queue
            .get_with_signal_check(Duration::from_secs(5), &stop, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn acked_message_is_not_redelivered() {
        let dir = TempDir::new().unwrap();
        let queue = Queue::open(dir.path().join("tasks.db")).unwrap();
        queue.enqueue(&envelope("t1")).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        queue
            .get_with_signal_check(Duration::from_secs(1), &stop, Duration::from_millis(10))
            .await
            .unwrap();
        queue.ack("t1").unwrap();

        let got = queue
            .get_with_signal_check(Duration::from_millis(50), &stop, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn expired_lease_redelivers_without_ack() {
        let dir = TempDir::new().unwrap();
        let queue = Queue::open_with_lease(dir.path().join("tasks.db"), 0).unwrap();
        queue.enqueue(&envelope("t1")).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let first = queue
            .get_with_signal_check(Duration::from_secs(1), &stop, Duration::from_millis(10))
            .await
            .unwrap();
        assert!(first.is_some());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let second = queue
            .get_with_signal_check(Duration::from_secs(1), &stop, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(second, Some(envelope("t1")));
    }
}

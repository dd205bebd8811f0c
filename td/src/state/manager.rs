//! StateManager - actor owning the task index `Store<TaskRecord>`.
//!
//! Processes commands via channels for thread-safe access from the
//! producer, consumer, and coordinator, all of which may run as separate
//! tokio tasks inside the same process.

use std::path::Path;

use taskstore::{Filter, Store};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::domain::TaskRecord;

use super::messages::{StateCommand, StateError, StateResponse, TaskQuery};

/// Broadcast when the index changes, for in-process observers (e.g. the
/// progress renderer refreshing its own cached counters).
#[derive(Debug, Clone)]
pub enum StateEvent {
    TaskCreated { uuid: String },
    TaskUpdated { uuid: String },
}

/// Handle to send commands to the `StateManager` actor.
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
    event_tx: tokio::sync::broadcast::Sender<StateEvent>,
}

impl StateManager {
    /// Spawn a new `StateManager` actor, rebuilding the SQLite index from
    /// the JSONL log on boot.
    pub fn spawn(store_path: impl AsRef<Path>) -> eyre::Result<Self> {
        debug!(store_path = %store_path.as_ref().display(), "StateManager::spawn: called");
        let store: Store<TaskRecord> = Store::open(store_path.as_ref())?;
        store.rebuild_index()?;

        let (tx, rx) = mpsc::channel(256);
        let (event_tx, _) = tokio::sync::broadcast::channel(64);

        tokio::spawn(actor_loop(store, rx));
        info!("StateManager spawned");

        Ok(Self { tx, event_tx })
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<StateEvent> {
        self.event_tx.subscribe()
    }

    pub async fn create(&self, record: TaskRecord) -> StateResponse<()> {
        debug!(uuid = %record.uuid, "StateManager::create: called");
        let uuid = record.uuid.clone();
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StateCommand::Create { record, reply })
            .await
            .map_err(|_| StateError::ChannelError)?;
        let result = rx.await.map_err(|_| StateError::ChannelError)?;
        if result.is_ok() {
            let _ = self.event_tx.send(StateEvent::TaskCreated { uuid });
        }
        result
    }

    pub async fn get(&self, uuid: &str) -> StateResponse<TaskRecord> {
        debug!(%uuid, "StateManager::get: called");
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StateCommand::Get {
                uuid: uuid.to_string(),
                reply,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        rx.await.map_err(|_| StateError::ChannelError)?
    }

    pub async fn update(&self, record: TaskRecord) -> StateResponse<()> {
        debug!(uuid = %record.uuid, status = ?record.status, "StateManager::update: called");
        let uuid = record.uuid.clone();
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StateCommand::Update { record, reply })
            .await
            .map_err(|_| StateError::ChannelError)?;
        let result = rx.await.map_err(|_| StateError::ChannelError)?;
        if result.is_ok() {
            let _ = self.event_tx.send(StateEvent::TaskUpdated { uuid });
        }
        result
    }

    pub async fn query(&self, query: TaskQuery) -> StateResponse<Vec<TaskRecord>> {
        debug!(?query, "StateManager::query: called");
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StateCommand::Query { query, reply })
            .await
            .map_err(|_| StateError::ChannelError)?;
        rx.await.map_err(|_| StateError::ChannelError)?
    }

    pub async fn rebuild_index(&self) -> StateResponse<()> {
        debug!("StateManager::rebuild_index: called");
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StateCommand::RebuildIndex { reply })
            .await
            .map_err(|_| StateError::ChannelError)?;
        rx.await.map_err(|_| StateError::ChannelError)?
    }

    pub async fn shutdown(&self) -> StateResponse<()> {
        debug!("StateManager::shutdown: called");
        self.tx.send(StateCommand::Shutdown).await.map_err(|_| StateError::ChannelError)
    }
}

fn build_filters(query: &TaskQuery) -> Vec<Filter> {
    let mut filters = Vec::new();
    if let Some(status) = &query.status {
        filters.push(Filter::eq("status", status.clone()));
    }
    if let Some(key_hash) = &query.key_hash {
        filters.push(Filter::eq("key_hash", key_hash.clone()));
    }
    if let Some(requester) = &query.requester {
        filters.push(Filter::eq("requester", requester.clone()));
    }
    filters
}

async fn actor_loop(store: Store<TaskRecord>, mut rx: mpsc::Receiver<StateCommand>) {
    debug!("actor_loop: started");
    while let Some(cmd) = rx.recv().await {
        match cmd {
            StateCommand::Create { record, reply } => {
                let result = store.insert(&record).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::Get { uuid, reply } => {
                let result = store.get(&uuid).map_err(|_| StateError::NotFound(uuid));
                let _ = reply.send(result);
            }
            StateCommand::Update { record, reply } => {
                let result = store.upsert(&record).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::Query { query, reply } => {
                let filters = build_filters(&query);
                let result = store.query(&filters).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::RebuildIndex { reply } => {
                let result = store.rebuild_index().map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }
            StateCommand::Shutdown => {
                debug!("actor_loop: shutdown received");
                break;
            }
        }
    }
    debug!("actor_loop: exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskKey;
    use tempfile::TempDir;

    fn key() -> TaskKey {
        TaskKey::GithubIssue {
            owner: "acme".into(),
            repo: "widgets".into(),
            number: 1,
        }
    }

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let dir = TempDir::new().unwrap();
        let mgr = StateManager::spawn(dir.path()).unwrap();
        let record = TaskRecord::new("u1".into(), &key(), "alice".into(), "anthropic".into(), "claude".into(), 200_000);
        mgr.create(record.clone()).await.unwrap();

        let fetched = mgr.get("u1").await.unwrap();
        assert_eq!(fetched.uuid, "u1");
        assert_eq!(fetched.key_hash, record.key_hash);
    }

    #[tokio::test]
    async fn query_by_status_filters_results() {
        let dir = TempDir::new().unwrap();
        let mgr = StateManager::spawn(dir.path()).unwrap();

        let mut r1 = TaskRecord::new("u1".into(), &key(), "alice".into(), "anthropic".into(), "claude".into(), 200_000);
        mgr.create(r1.clone()).await.unwrap();
        r1.status = crate::domain::TaskStatus::Completed;
        mgr.update(r1).await.unwrap();

        let r2 = TaskRecord::new("u2".into(), &key(), "bob".into(), "anthropic".into(), "claude".into(), 200_000);
        mgr.create(r2).await.unwrap();

        let completed = mgr
            .query(TaskQuery {
                status: Some("completed".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].uuid, "u1");
    }

    #[tokio::test]
    async fn update_broadcasts_event() {
        let dir = TempDir::new().unwrap();
        let mgr = StateManager::spawn(dir.path()).unwrap();
        let mut events = mgr.subscribe_events();

        let record = TaskRecord::new("u1".into(), &key(), "alice".into(), "anthropic".into(), "claude".into(), 200_000);
        mgr.create(record).await.unwrap();

        let evt = events.recv().await.unwrap();
        assert!(matches!(evt, StateEvent::TaskCreated { uuid } if uuid == "u1"));
    }
}

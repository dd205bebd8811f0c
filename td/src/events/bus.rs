//! Central pub/sub for `AgentEvent`s: a `tokio::sync::broadcast`-backed bus
//! the file logger and, optionally, a metrics exporter subscribe to.

use tokio::sync::broadcast;
use tracing::debug;

use super::types::AgentEvent;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

pub struct EventBus {
    tx: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Fire-and-forget: if there are no subscribers, the event is dropped.
    pub fn emit(&self, event: AgentEvent) {
        debug!(event_type = event.event_type(), task_uuid = event.task_uuid(), "EventBus::emit");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }

    /// An emitter pre-bound to one task, for convenience at call sites that
    /// only ever emit events about the task they're handling.
    pub fn emitter_for(&self, task_uuid: impl Into<String>) -> EventEmitter {
        EventEmitter {
            tx: self.tx.clone(),
            task_uuid: task_uuid.into(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<AgentEvent>,
    task_uuid: String,
}

impl EventEmitter {
    pub fn task_uuid(&self) -> &str {
        &self.task_uuid
    }

    pub fn emit(&self, event: AgentEvent) {
        let _ = self.tx.send(event);
    }

    pub fn phase_started(&self, phase: &str) {
        self.emit(AgentEvent::PhaseStarted {
            task_uuid: self.task_uuid.clone(),
            phase: phase.to_string(),
        });
    }

    pub fn phase_completed(&self, phase: &str, duration_ms: u64) {
        self.emit(AgentEvent::PhaseCompleted {
            task_uuid: self.task_uuid.clone(),
            phase: phase.to_string(),
            duration_ms,
        });
    }

    pub fn tool_call_started(&self, tool_name: &str) {
        self.emit(AgentEvent::ToolCallStarted {
            task_uuid: self.task_uuid.clone(),
            tool_name: tool_name.to_string(),
        });
    }

    pub fn tool_call_completed(&self, tool_name: &str, success: bool, duration_ms: u64) {
        self.emit(AgentEvent::ToolCallCompleted {
            task_uuid: self.task_uuid.clone(),
            tool_name: tool_name.to_string(),
            success,
            duration_ms,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.emit(AgentEvent::TaskStarted {
            task_uuid: "t1".to_string(),
            is_resumed: false,
        });
        let received = rx.recv().await.unwrap();
        assert_eq!(received.task_uuid(), "t1");
    }

    #[tokio::test]
    async fn emitter_binds_task_uuid() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let emitter = bus.emitter_for("t2");
        emitter.phase_started("planning");
        let received = rx.recv().await.unwrap();
        assert_eq!(received.task_uuid(), "t2");
        assert_eq!(received.event_type(), "PhaseStarted");
    }

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.emit(AgentEvent::TaskStopped { task_uuid: "t3".to_string() });
    }
}

//! `AgentEvent` - the vocabulary of observable orchestrator activity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle and phase events emitted by the producer, consumer, and
/// coordinator. Every variant carries `task_uuid` so a consumer can filter
/// to a single task's stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentEvent {
    TaskEnqueued { task_uuid: String, key_hash: String, requester: String },
    TaskStarted { task_uuid: String, is_resumed: bool },
    PhaseStarted { task_uuid: String, phase: String },
    PhaseCompleted { task_uuid: String, phase: String, duration_ms: u64 },
    ToolCallStarted { task_uuid: String, tool_name: String },
    ToolCallCompleted { task_uuid: String, tool_name: String, success: bool, duration_ms: u64 },
    ReflectionTriggered { task_uuid: String, reason: String },
    ReplanApplied { task_uuid: String, replan_type: String, target_phase: String },
    TaskCompleted { task_uuid: String },
    TaskFailed { task_uuid: String, message: String },
    TaskPaused { task_uuid: String },
    TaskStopped { task_uuid: String },
}

impl AgentEvent {
    pub fn task_uuid(&self) -> &str {
        match self {
            AgentEvent::TaskEnqueued { task_uuid, .. }
            | AgentEvent::TaskStarted { task_uuid, .. }
            | AgentEvent::PhaseStarted { task_uuid, .. }
            | AgentEvent::PhaseCompleted { task_uuid, .. }
            | AgentEvent::ToolCallStarted { task_uuid, .. }
            | AgentEvent::ToolCallCompleted { task_uuid, .. }
            | AgentEvent::ReflectionTriggered { task_uuid, .. }
            | AgentEvent::ReplanApplied { task_uuid, .. }
            | AgentEvent::TaskCompleted { task_uuid }
            | AgentEvent::TaskFailed { task_uuid, .. }
            | AgentEvent::TaskPaused { task_uuid }
            | AgentEvent::TaskStopped { task_uuid } => task_uuid,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            AgentEvent::TaskEnqueued { .. } => "TaskEnqueued",
            AgentEvent::TaskStarted { .. } => "TaskStarted",
            AgentEvent::PhaseStarted { .. } => "PhaseStarted",
            AgentEvent::PhaseCompleted { .. } => "PhaseCompleted",
            AgentEvent::ToolCallStarted { .. } => "ToolCallStarted",
            AgentEvent::ToolCallCompleted { .. } => "ToolCallCompleted",
            AgentEvent::ReflectionTriggered { .. } => "ReflectionTriggered",
            AgentEvent::ReplanApplied { .. } => "ReplanApplied",
            AgentEvent::TaskCompleted { .. } => "TaskCompleted",
            AgentEvent::TaskFailed { .. } => "TaskFailed",
            AgentEvent::TaskPaused { .. } => "TaskPaused",
            AgentEvent::TaskStopped { .. } => "TaskStopped",
        }
    }
}

/// A timestamped event, as persisted to `events.jsonl`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub event: AgentEvent,
}

impl EventLogEntry {
    pub fn new(event: AgentEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

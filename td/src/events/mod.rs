//! Event bus for observability: every lifecycle/phase/tool transition emits
//! an `AgentEvent` to an in-process broadcast bus, consumed by an
//! append-only file logger and (optionally) other subscribers.

mod bus;
mod logger;
mod types;

pub use bus::{EventBus, EventEmitter, DEFAULT_CHANNEL_CAPACITY};
pub use logger::{read_task_events, spawn_event_logger, EventLogger};
pub use types::{AgentEvent, EventLogEntry};

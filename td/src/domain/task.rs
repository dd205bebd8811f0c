//! `Task` - the runtime handle the coordinator drives, wrapping a `TaskKey`
//! plus whatever capability the tracker client exposes for it.

use std::sync::Arc;

use super::TaskKey;
use crate::tracker::TrackerTask;

/// One dequeued unit of work: identity, attempt metadata, and a handle to
/// the live tracker item.
pub struct Task {
    pub key: TaskKey,
    pub uuid: String,
    pub requester: String,
    pub is_resumed: bool,
    pub tracker: Arc<dyn TrackerTask>,
}

impl Task {
    pub fn new(key: TaskKey, uuid: String, requester: String, is_resumed: bool, tracker: Arc<dyn TrackerTask>) -> Self {
        Self {
            key,
            uuid,
            requester,
            is_resumed,
            tracker,
        }
    }
}

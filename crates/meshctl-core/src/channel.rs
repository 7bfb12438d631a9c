//! Event channel shared by the backend's collaborators
//!
//! Control sessions and the engine report through an `EventSink`, which the
//! backend wires to its single ordered inbox. Posting never blocks and never
//! drops while the backend is alive.

use crate::control::{NetInfo, Status};
use crate::engine::EngineStatus;
use std::sync::Arc;

// ----------------------------------------------------------------------------
// Event: Collaborators → Backend
// ----------------------------------------------------------------------------

/// Events delivered asynchronously to the backend
#[derive(Debug, Clone)]
pub enum Event {
    /// Status from the control session of the given generation
    ControlStatus { generation: u64, status: Status },
    EngineStatus(EngineStatus),
    NetInfo(NetInfo),
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::ControlStatus { .. } => "control-status",
            Event::EngineStatus(_) => "engine-status",
            Event::NetInfo(_) => "netinfo",
        }
    }
}

/// Cloneable, thread-safe handle for posting events
#[derive(Clone)]
pub struct EventSink(Arc<dyn Fn(Event) + Send + Sync>);

impl EventSink {
    pub fn new(post: impl Fn(Event) + Send + Sync + 'static) -> Self {
        Self(Arc::new(post))
    }

    pub fn post(&self, event: Event) {
        (self.0)(event)
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EventSink")
    }
}

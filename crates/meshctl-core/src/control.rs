//! Control session interface
//!
//! The control session maintains the authenticated relationship with the
//! coordination service. Its retry and transport logic live behind this
//! trait; the backend only issues commands and consumes status events.

use crate::channel::{Event, EventSink};
use crate::errors::{ControlError, MeshResult};
use crate::netmap::NetworkMap;
use crate::prefs::Persist;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

// ----------------------------------------------------------------------------
// Session Inputs and Outputs
// ----------------------------------------------------------------------------

/// Flags for a login command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoginFlags {
    /// A human is present and will visit a browse URL
    pub interactive: bool,
}

impl LoginFlags {
    pub const NONE: LoginFlags = LoginFlags { interactive: false };
    pub const INTERACTIVE: LoginFlags = LoginFlags { interactive: true };
}

/// Host description reported to the coordination service
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Hostinfo {
    pub hostname: String,
    pub os: String,
}

impl Hostinfo {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            os: std::env::consts::OS.to_string(),
        }
    }
}

/// Network conditions observed by the data plane
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetInfo {
    /// Relay region with the lowest latency, 0 when unknown
    pub preferred_relay: u16,
    pub working_udp: bool,
}

/// Asynchronous status delivered by a control session
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Status {
    /// Control-plane failure; the session retries on its own
    pub error: Option<String>,
    /// URL a human must visit to complete authentication
    pub url: Option<String>,
    pub login_finished: bool,
    pub netmap: Option<NetworkMap>,
    /// Identity as the session currently knows it
    pub persist: Option<Persist>,
}

// ----------------------------------------------------------------------------
// Session Traits
// ----------------------------------------------------------------------------

/// One control session. Commands other than logout must not block.
#[async_trait]
pub trait ControlSession: Send + Sync {
    fn login(&self, flags: LoginFlags);
    async fn logout(&self) -> Result<(), ControlError>;
    fn set_paused(&self, paused: bool);
    fn shutdown(&self);
    /// False while authentication waits on a human
    fn auth_can_continue(&self) -> bool;
    fn set_hostinfo(&self, hostinfo: Hostinfo);
    fn set_netinfo(&self, netinfo: NetInfo);
    fn update_endpoints(&self, endpoints: Vec<SocketAddr>);
}

/// Everything a new session starts from
pub struct SessionOptions {
    pub persist: Persist,
    pub hostinfo: Hostinfo,
    pub control_url: String,
    /// Where the session delivers its status
    pub observer: ControlObserver,
}

/// Creates control sessions; the backend never reuses one after discarding it
pub trait ControlSessionFactory: Send + Sync {
    fn new_session(&self, opts: SessionOptions) -> MeshResult<Box<dyn ControlSession>>;
}

/// Status callback handed to a session, tagged with the session's generation
#[derive(Clone)]
pub struct ControlObserver {
    generation: u64,
    sink: EventSink,
}

impl ControlObserver {
    pub fn new(generation: u64, sink: EventSink) -> Self {
        Self { generation, sink }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver a status; never blocks
    pub fn send_status(&self, status: Status) {
        self.sink.post(Event::ControlStatus {
            generation: self.generation,
            status,
        });
    }
}

impl std::fmt::Debug for ControlObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlObserver")
            .field("generation", &self.generation)
            .finish()
    }
}

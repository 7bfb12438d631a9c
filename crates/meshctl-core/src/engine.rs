//! Data-plane engine interface

use crate::channel::{Event, EventSink};
use crate::control::NetInfo;
use crate::errors::EngineError;
use crate::translate::{DnsConfig, RouterConfig, WireGuardConfig};
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Connectivity report from the engine
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Live connections through relay servers
    pub relay_links: u32,
    pub as_of: Timestamp,
    pub local_endpoints: Vec<SocketAddr>,
    pub error: Option<String>,
}

impl EngineStatus {
    pub fn has_relay_link(&self) -> bool {
        self.relay_links > 0
    }
}

/// Packet-forwarding engine
pub trait Engine: Send + Sync {
    fn reconfig(&self, wg: &WireGuardConfig, router: &RouterConfig, dns: &DnsConfig) -> Result<(), EngineError>;
    fn set_status_callback(&self, sink: EngineStatusSink);
}

/// Status callback handed to the engine
///
/// Cloneable and callable concurrently from any number of reporting paths;
/// reports are serialized by the backend's inbox.
#[derive(Clone)]
pub struct EngineStatusSink {
    sink: EventSink,
}

impl EngineStatusSink {
    pub fn new(sink: EventSink) -> Self {
        Self { sink }
    }

    pub fn report(&self, status: EngineStatus) {
        self.sink.post(Event::EngineStatus(status));
    }

    pub fn report_netinfo(&self, netinfo: NetInfo) {
        self.sink.post(Event::NetInfo(netinfo));
    }
}

impl std::fmt::Debug for EngineStatusSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EngineStatusSink")
    }
}

//! Derived connection state
//!
//! `ConnectionState` is never stored authoritatively; the orchestrator samples
//! its inputs after every mutation and recomputes it with [`next_state`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend connection state as shown to user interfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Before the first start, or while switching sessions
    #[default]
    NoState,
    NeedsLogin,
    NeedsMachineAuth,
    Stopped,
    Starting,
    Running,
}

impl ConnectionState {
    /// States in which the data plane carries the translated configuration
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Starting | ConnectionState::Running)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::NoState => "NoState",
            ConnectionState::NeedsLogin => "NeedsLogin",
            ConnectionState::NeedsMachineAuth => "NeedsMachineAuth",
            ConnectionState::Stopped => "Stopped",
            ConnectionState::Starting => "Starting",
            ConnectionState::Running => "Running",
        };
        f.write_str(name)
    }
}

/// Everything the state computation samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateInputs {
    pub current: ConnectionState,
    pub have_netmap: bool,
    pub machine_authorized: bool,
    pub want_running: bool,
    pub logged_out: bool,
    pub key_expired: bool,
    pub relay_link: bool,
    /// Engine updates withheld while authentication is pending
    pub engine_blocked: bool,
    pub has_node_key: bool,
    /// False when the control session is waiting on a human (URL visit)
    pub auth_can_continue: bool,
}

/// Compute the next connection state
pub fn next_state(inputs: &StateInputs) -> ConnectionState {
    use ConnectionState::*;

    if !inputs.want_running && !inputs.logged_out && !inputs.engine_blocked && inputs.has_node_key {
        return Stopped;
    }
    if !inputs.have_netmap {
        if inputs.logged_out || !inputs.auth_can_continue {
            return NeedsLogin;
        }
        // First contact keeps NoState until control answers. Without a map
        // there is nothing to be Running with.
        return match inputs.current {
            Stopped | Running => Starting,
            other => other,
        };
    }
    if !inputs.want_running {
        return Stopped;
    }
    if inputs.key_expired {
        return NeedsLogin;
    }
    if !inputs.machine_authorized {
        return NeedsMachineAuth;
    }
    // Running is reached only from Starting and is latched once reached.
    match inputs.current {
        Running => Running,
        Starting if inputs.relay_link => Running,
        _ => Starting,
    }
}

/// Whether the control session should be paused in `state`
pub fn should_pause(state: ConnectionState, have_netmap: bool) -> bool {
    state == ConnectionState::Stopped && have_netmap
}

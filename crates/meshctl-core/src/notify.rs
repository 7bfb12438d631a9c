//! Outbound notifications to the single UI subscriber

use crate::prefs::Prefs;
use crate::state::ConnectionState;
use serde::{Deserialize, Serialize};

/// One event in the ordered notification stream
///
/// Exactly one of the optional fields is set per notification. The sequence
/// number is assigned on delivery and increases by one for every emitted
/// notification, so gaps or reordering are detectable by subscribers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Notify {
    pub sequence: u64,
    pub state: Option<ConnectionState>,
    /// Redacted preferences
    pub prefs: Option<Prefs>,
    pub browse_to_url: Option<String>,
    pub login_finished: bool,
    pub error_message: Option<String>,
}

impl Notify {
    pub fn state(state: ConnectionState) -> Self {
        Self {
            state: Some(state),
            ..Default::default()
        }
    }

    pub fn prefs(prefs: &Prefs) -> Self {
        Self {
            prefs: Some(prefs.redacted()),
            ..Default::default()
        }
    }

    pub fn browse_to_url(url: impl Into<String>) -> Self {
        Self {
            browse_to_url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn login_finished() -> Self {
        Self {
            login_finished: true,
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Short label for log lines and test assertions
    pub fn kind(&self) -> &'static str {
        if self.state.is_some() {
            "state"
        } else if self.prefs.is_some() {
            "prefs"
        } else if self.browse_to_url.is_some() {
            "browse"
        } else if self.login_finished {
            "login-finished"
        } else if self.error_message.is_some() {
            "error"
        } else {
            "empty"
        }
    }
}

//! Centralized Configuration Management
//!
//! Channel sizing, behavior policies and the top-level `BackendConfig`,
//! loadable from a TOML file.

use crate::errors::{MeshError, MeshResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How long a browse-to URL from the control session stays reusable
pub const AUTH_URL_VALIDITY: Duration = Duration::from_secs(6 * 24 * 60 * 60);

/// Coordination server used when a profile sets no control URL
pub const DEFAULT_CONTROL_URL: &str = "https://controlplane.meshctl.dev";

/// Name of the tunnel interface handed to the engine
pub const DEFAULT_TUNNEL_NAME: &str = "meshctl0";

/// Longest the backend waits for the control session to confirm a logout
pub const LOGOUT_TIMEOUT: Duration = Duration::from_secs(30);

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the channels between the backend and its subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Capacity of the notification queue (Backend → UI)
    pub notify_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            notify_buffer_size: 64, // UI updates need responsiveness
        }
    }
}

impl ChannelConfig {
    /// Create configuration for low-memory environments
    pub fn low_memory() -> Self {
        Self {
            notify_buffer_size: 8,
        }
    }

    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            notify_buffer_size: 256,
        }
    }
}

// ----------------------------------------------------------------------------
// Compatibility Policies
// ----------------------------------------------------------------------------

/// When a login-finished notification is emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoginFinishedPolicy {
    /// Every authenticated status that arrives while the engine was blocked
    /// awaiting authentication
    WhileBlocked,
    /// The first authenticated status after each issued login command
    OncePerLogin,
}

/// Observable orderings that user interfaces depend on
///
/// The defaults reproduce the established notification contract. Each field
/// names one behavior so that changing it is a deliberate decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompatPolicy {
    /// Toggling WantRunning emits the state notification before the prefs one
    pub state_before_prefs: bool,
    pub login_finished: LoginFinishedPolicy,
    /// Re-issue login whenever WantRunning turns on, even if already logged in
    pub relogin_on_connect: bool,
    /// Pause the control session while stopped with a network map held
    pub pause_when_stopped: bool,
}

impl Default for CompatPolicy {
    fn default() -> Self {
        Self {
            state_before_prefs: true,
            login_finished: LoginFinishedPolicy::WhileBlocked,
            relogin_on_connect: false,
            pause_when_stopped: true,
        }
    }
}

// ----------------------------------------------------------------------------
// Backend Configuration
// ----------------------------------------------------------------------------

/// Top-level configuration of the backend orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub channels: ChannelConfig,
    pub policy: CompatPolicy,
    pub auth_url_validity_secs: u64,
    pub logout_timeout_ms: u64,
    pub tunnel_name: String,
    pub default_control_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            channels: ChannelConfig::default(),
            policy: CompatPolicy::default(),
            auth_url_validity_secs: AUTH_URL_VALIDITY.as_secs(),
            logout_timeout_ms: LOGOUT_TIMEOUT.as_millis() as u64,
            tunnel_name: DEFAULT_TUNNEL_NAME.to_string(),
            default_control_url: DEFAULT_CONTROL_URL.to_string(),
        }
    }
}

impl BackendConfig {
    /// Parse configuration from TOML text; missing keys take defaults
    pub fn from_toml_str(text: &str) -> MeshResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> MeshResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            channels: ChannelConfig::testing(),
            ..Default::default()
        }
    }

    /// Reject values the backend cannot run with
    pub fn validate(&self) -> MeshResult<()> {
        let invalid = |reason: &str| {
            Err(MeshError::Configuration {
                reason: reason.to_string(),
            })
        };
        if self.channels.notify_buffer_size == 0 {
            return invalid("channels.notify_buffer_size must be at least 1");
        }
        if self.logout_timeout_ms == 0 {
            return invalid("logout_timeout_ms must be positive");
        }
        if self.tunnel_name.is_empty() {
            return invalid("tunnel_name must not be empty");
        }
        if url::Url::parse(&self.default_control_url).is_err() {
            return invalid("default_control_url is not a valid URL");
        }
        Ok(())
    }

    pub fn auth_url_validity(&self) -> Duration {
        Duration::from_secs(self.auth_url_validity_secs)
    }

    pub fn logout_timeout(&self) -> Duration {
        Duration::from_millis(self.logout_timeout_ms)
    }
}

//! Backend State Management
//!
//! Everything the backend task owns: the profile manager, the current control
//! session, the last network map and the derived connection state, plus the
//! helpers that keep them consistent after each mutation.

use crate::profiles::ProfileManager;
use meshctl_core::{
    next_state, should_pause, translate, BackendConfig, ConnectionState, ControlObserver, ControlSession,
    ControlSessionFactory, DataPlaneConfig, Engine, EngineStatus, EventSink, Hostinfo, LoginFlags,
    MeshError, MeshResult, NetworkMap, Prefs, SessionOptions, StateInputs, StateStore, TimeSource,
    Timestamp, TranslateOptions,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

// ----------------------------------------------------------------------------
// Control Session Handle
// ----------------------------------------------------------------------------

/// The current control session and what the backend knows about it
pub struct SessionHandle {
    pub generation: u64,
    pub session: Arc<dyn ControlSession>,
    pub paused: bool,
    /// An authenticated status arrived on this session
    pub logged_in: bool,
    /// A login was issued and its completion not yet seen
    pub login_pending: bool,
}

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Counters exposed for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendStats {
    pub commands_processed: u64,
    pub events_processed: u64,
    pub notifications_emitted: u64,
    pub sessions_created: u64,
    pub stale_statuses_dropped: u64,
    pub reconfigs: u64,
    pub reconfig_failures: u64,
}

// ----------------------------------------------------------------------------
// Backend State
// ----------------------------------------------------------------------------

/// Collaborators the backend was built with
pub struct Collaborators {
    pub store: Arc<dyn StateStore>,
    pub factory: Arc<dyn ControlSessionFactory>,
    pub engine: Arc<dyn Engine>,
    pub clock: Arc<dyn TimeSource>,
    /// Where new sessions deliver their status
    pub sink: EventSink,
}

/// State owned by the backend task
pub struct BackendState {
    pub config: BackendConfig,
    pub deps: Collaborators,
    pub profiles: ProfileManager,
    pub session: Option<SessionHandle>,
    next_generation: u64,
    pub netmap: Option<NetworkMap>,
    pub state: ConnectionState,
    /// Engine held on the zero config until authentication completes
    pub engine_blocked: bool,
    pub key_expired: bool,
    /// The user asked for an interactive login that has not finished yet
    pub interactive: bool,
    /// Last browse URL and when it arrived
    pub auth_url: Option<(String, Timestamp)>,
    pub engine_status: EngineStatus,
    last_config: Option<DataPlaneConfig>,
    pub stats: BackendStats,
}

impl BackendState {
    pub fn new(config: BackendConfig, deps: Collaborators) -> MeshResult<Self> {
        let profiles = ProfileManager::load(deps.store.clone())?;
        Ok(Self {
            config,
            deps,
            profiles,
            session: None,
            next_generation: 0,
            netmap: None,
            state: ConnectionState::NoState,
            engine_blocked: false,
            key_expired: false,
            interactive: false,
            auth_url: None,
            engine_status: EngineStatus::default(),
            last_config: None,
            stats: BackendStats::default(),
        })
    }

    pub fn prefs(&self) -> &Prefs {
        self.profiles.current_prefs()
    }

    pub fn now(&self) -> Timestamp {
        self.deps.clock.now()
    }

    pub fn session(&self) -> MeshResult<&SessionHandle> {
        self.session.as_ref().ok_or(MeshError::NoSession)
    }

    // ------------------------------------------------------------------------
    // Session Lifecycle
    // ------------------------------------------------------------------------

    /// Shut the current session down in the background
    pub fn discard_session(&mut self) {
        if let Some(old) = self.session.take() {
            debug!("Discarding control session generation {}", old.generation);
            tokio::spawn(async move {
                old.session.shutdown();
            });
        }
    }

    /// Discard the current session and create a fresh one from the prefs
    pub fn replace_session(&mut self) -> MeshResult<()> {
        self.discard_session();

        self.next_generation += 1;
        let generation = self.next_generation;
        let prefs = self.prefs();
        let opts = SessionOptions {
            persist: prefs.persist.clone(),
            hostinfo: Hostinfo::new(prefs.hostname.clone()),
            control_url: prefs.control_url_or(&self.config.default_control_url).to_string(),
            observer: ControlObserver::new(generation, self.deps.sink.clone()),
        };
        let session = self.deps.factory.new_session(opts)?;
        self.session = Some(SessionHandle {
            generation,
            session: Arc::from(session),
            paused: false,
            logged_in: false,
            login_pending: false,
        });
        self.stats.sessions_created += 1;
        info!("Created control session generation {}", generation);
        Ok(())
    }

    pub fn login(&mut self, flags: LoginFlags) -> MeshResult<()> {
        let handle = self.session.as_mut().ok_or(MeshError::NoSession)?;
        debug!("Login (interactive: {}) on session {}", flags.interactive, handle.generation);
        handle.login_pending = true;
        handle.session.login(flags);
        Ok(())
    }

    /// Forget everything learned from the previous session or profile
    pub fn clear_session_data(&mut self) {
        self.netmap = None;
        self.key_expired = false;
        self.interactive = false;
        self.auth_url = None;
        self.engine_status = EngineStatus::default();
    }

    // ------------------------------------------------------------------------
    // Derived State
    // ------------------------------------------------------------------------

    pub fn state_inputs(&self) -> StateInputs {
        let prefs = self.prefs();
        let netmap = self.netmap.as_ref();
        StateInputs {
            current: self.state,
            have_netmap: netmap.is_some(),
            machine_authorized: netmap.map_or(false, |nm| nm.machine_authorized()),
            want_running: prefs.want_running,
            logged_out: prefs.logged_out,
            key_expired: self.key_expired,
            relay_link: self.engine_status.has_relay_link(),
            engine_blocked: self.engine_blocked,
            has_node_key: prefs.has_node_key(),
            auth_can_continue: self
                .session
                .as_ref()
                .map_or(true, |h| h.session.auth_can_continue()),
        }
    }

    /// Recompute the connection state, push the data plane and apply the
    /// pause policy; returns the new state when it changed
    pub fn recompute(&mut self) -> Option<ConnectionState> {
        let next = next_state(&self.state_inputs());
        let changed = next != self.state;
        if changed {
            info!("State: {} -> {}", self.state, next);
            self.state = next;
            if !next.is_active() {
                self.engine_status.relay_links = 0;
            }
        }
        self.push_dataplane();
        self.apply_pause();
        changed.then_some(next)
    }

    /// Force a state without recomputing, used while sessions are swapped
    pub fn set_state(&mut self, state: ConnectionState) {
        if state != self.state {
            info!("State: {} -> {}", self.state, state);
            self.state = state;
        }
    }

    fn desired_config(&self) -> DataPlaneConfig {
        match &self.netmap {
            Some(nm) if self.state.is_active() && !self.engine_blocked => {
                let prefs = self.prefs();
                let opts = TranslateOptions::from_prefs(prefs, &self.config.tunnel_name, self.now());
                translate(&prefs.persist.private_node_key, nm, &opts)
            }
            _ => DataPlaneConfig::default(),
        }
    }

    /// Reconfigure the engine if the desired configuration changed
    pub fn push_dataplane(&mut self) {
        let desired = self.desired_config();
        if self.last_config.as_ref() == Some(&desired) {
            return;
        }
        self.stats.reconfigs += 1;
        match self
            .deps
            .engine
            .reconfig(&desired.wireguard, &desired.router, &desired.dns)
        {
            Ok(()) => {
                debug!(
                    "Engine reconfigured: {} peer(s), {} route(s)",
                    desired.wireguard.peers.len(),
                    desired.router.routes.len()
                );
                self.last_config = Some(desired);
            }
            Err(e) => {
                // The engine recovers on its own; state still advances.
                self.stats.reconfig_failures += 1;
                warn!("Engine reconfiguration failed: {}", e);
            }
        }
    }

    /// Pause or unpause the current session, issuing commands only on change
    pub fn apply_pause(&mut self) {
        let want = self.config.policy.pause_when_stopped && should_pause(self.state, self.netmap.is_some());
        if let Some(handle) = self.session.as_mut() {
            if handle.paused != want {
                debug!("Session {} paused: {}", handle.generation, want);
                handle.paused = want;
                handle.session.set_paused(want);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Browse URLs
    // ------------------------------------------------------------------------

    /// A cached browse URL still inside its validity window and still on the
    /// profile's control server
    pub fn fresh_auth_url(&self) -> Option<&str> {
        let (url, received) = self.auth_url.as_ref()?;
        let age = self.now() - *received;
        if u128::from(age) < self.config.auth_url_validity().as_millis() && self.browse_url_allowed(url) {
            Some(url.as_str())
        } else {
            None
        }
    }

    /// Only URLs on the configured control server are shown to the user
    pub fn browse_url_allowed(&self, url: &str) -> bool {
        let control_url = &self.prefs().control_url;
        let Ok(target) = url::Url::parse(url) else {
            return false;
        };
        if control_url.is_empty() {
            return true;
        }
        match url::Url::parse(control_url) {
            Ok(control) => control.host_str() == target.host_str() && control.port() == target.port(),
            Err(_) => false,
        }
    }
}

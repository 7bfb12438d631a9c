//! Backend Command and Event Handlers
//!
//! Every handler mutates `BackendState` and appends the notifications it
//! produced, in order, to `notes`. The task flushes `notes` even when the
//! handler fails part-way, so phases that completed are still reported.

use super::state::BackendState;
use meshctl_core::{
    ConnectionState, ControlError, EngineStatus, LoginFinishedPolicy, LoginFlags, MeshResult, NetInfo, Notify,
    Prefs, PrefsEdit, ProfileId, Status,
};
use tracing::{debug, info, warn};

/// Command and event handlers for the backend task
pub struct CommandHandlers;

impl CommandHandlers {
    // ------------------------------------------------------------------------
    // UI Commands
    // ------------------------------------------------------------------------

    /// Create a fresh control session and report prefs and state
    pub fn handle_start(state: &mut BackendState, notes: &mut Vec<Notify>) -> MeshResult<()> {
        state.replace_session()?;
        Self::login_if_identity_cached(state)?;

        notes.push(Notify::prefs(state.prefs()));
        state.recompute();
        notes.push(Notify::state(state.state));
        Ok(())
    }

    pub fn handle_edit_prefs(
        state: &mut BackendState,
        edit: PrefsEdit,
        notes: &mut Vec<Notify>,
    ) -> MeshResult<Prefs> {
        edit.validate()?;
        let old = state.prefs().clone();
        let new = edit.apply_to(&old);
        state.profiles.set_current_prefs(new.clone())?;

        if old.want_running != new.want_running && state.session.is_some() {
            if new.want_running {
                let logged_in = state.session()?.logged_in;
                if !logged_in || state.config.policy.relogin_on_connect {
                    state.login(LoginFlags::NONE)?;
                }
            }
            let changed = state.recompute().map(Notify::state);
            if state.config.policy.state_before_prefs {
                notes.extend(changed);
                notes.push(Notify::prefs(&new));
            } else {
                notes.push(Notify::prefs(&new));
                notes.extend(changed);
            }
        } else {
            if old.hostname != new.hostname {
                if let Some(handle) = &state.session {
                    handle.session.set_hostinfo(meshctl_core::Hostinfo::new(new.hostname.clone()));
                }
            }
            if old.routing_differs(&new) {
                state.push_dataplane();
            }
            notes.push(Notify::prefs(&new));
        }
        Ok(new.redacted())
    }

    pub fn handle_start_login_interactive(state: &mut BackendState, notes: &mut Vec<Notify>) -> MeshResult<()> {
        state.session()?;
        state.interactive = true;

        if let Some(url) = state.fresh_auth_url() {
            debug!("Reusing browse URL from the previous login attempt");
            notes.push(Notify::browse_to_url(url));
            return Ok(());
        }

        state.engine_blocked = true;
        state.login(LoginFlags::INTERACTIVE)?;
        notes.extend(state.recompute().map(Notify::state));
        Ok(())
    }

    /// Log out in phases, reporting each one
    pub async fn handle_logout(state: &mut BackendState, notes: &mut Vec<Notify>) -> MeshResult<()> {
        if state.state == ConnectionState::NeedsLogin {
            debug!("Logout while already logged out; nothing to do");
            return Ok(());
        }
        let session = state.session()?.session.clone();

        // Stop.
        let mut prefs = state.prefs().clone();
        prefs.want_running = false;
        prefs.logged_out = true;
        state.profiles.set_current_prefs(prefs.clone())?;
        let changed = state.recompute().map(Notify::state);
        if state.config.policy.state_before_prefs {
            notes.extend(changed);
            notes.push(Notify::prefs(&prefs));
        } else {
            notes.push(Notify::prefs(&prefs));
            notes.extend(changed);
        }

        let limit = state.config.logout_timeout();
        match tokio::time::timeout(limit, session.logout()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("Control session did not confirm logout within {:?}", limit);
                return Err(ControlError::Timeout {
                    operation: "logout",
                    timeout_ms: state.config.logout_timeout_ms,
                }
                .into());
            }
        }
        info!("Logged out of control server");

        // Replace the session.
        state.clear_session_data();
        state.apply_pause();
        state.replace_session()?;
        state.set_state(ConnectionState::NoState);
        notes.push(Notify::state(ConnectionState::NoState));

        state.profiles.reset_current()?;
        notes.push(Notify::prefs(state.prefs()));

        state.engine_blocked = true;
        notes.extend(state.recompute().map(Notify::state));
        Ok(())
    }

    pub fn handle_new_profile(state: &mut BackendState, notes: &mut Vec<Notify>) -> MeshResult<ProfileId> {
        let id = state.profiles.new_profile()?;
        Self::reset_for_profile_change(state, notes)?;
        Ok(id)
    }

    pub fn handle_switch_profile(
        state: &mut BackendState,
        id: ProfileId,
        notes: &mut Vec<Notify>,
    ) -> MeshResult<()> {
        if &id == state.profiles.current_id() {
            return Ok(());
        }
        state.profiles.switch_to(&id)?;
        Self::reset_for_profile_change(state, notes)
    }

    fn reset_for_profile_change(state: &mut BackendState, notes: &mut Vec<Notify>) -> MeshResult<()> {
        state.clear_session_data();
        state.set_state(ConnectionState::NoState);
        state.push_dataplane();
        state.replace_session()?;
        Self::login_if_identity_cached(state)?;

        notes.push(Notify::prefs(state.prefs()));
        state.recompute();
        notes.push(Notify::state(state.state));
        Ok(())
    }

    fn login_if_identity_cached(state: &mut BackendState) -> MeshResult<()> {
        let prefs = state.prefs();
        if prefs.has_node_key() && !prefs.logged_out {
            state.engine_blocked = false;
            state.login(LoginFlags::NONE)
        } else {
            state.engine_blocked = true;
            Ok(())
        }
    }

    // ------------------------------------------------------------------------
    // Collaborator Events
    // ------------------------------------------------------------------------

    pub fn handle_control_status(
        state: &mut BackendState,
        generation: u64,
        status: Status,
        notes: &mut Vec<Notify>,
    ) -> MeshResult<()> {
        let policy = state.config.policy.clone();
        let now = state.now();
        let was_blocked = state.engine_blocked;
        let mut prefs = state.prefs().clone();
        let Some(handle) = state.session.as_mut() else {
            debug!("Dropping control status: no session");
            return Ok(());
        };
        if handle.generation != generation {
            debug!("Dropping status from stale session generation {}", generation);
            state.stats.stale_statuses_dropped += 1;
            return Ok(());
        }
        if let Some(err) = status.error {
            warn!("Control session error: {}", err);
            notes.push(Notify::error(err));
            return Ok(());
        }

        if status.login_finished {
            let emit = match policy.login_finished {
                LoginFinishedPolicy::WhileBlocked => was_blocked,
                LoginFinishedPolicy::OncePerLogin => handle.login_pending,
            };
            handle.logged_in = true;
            handle.login_pending = false;
            state.auth_url = None;
            state.engine_blocked = false;
            if emit {
                notes.push(Notify::login_finished());
            }
            // An interactive login means the user wants to be connected.
            if state.interactive {
                state.interactive = false;
                prefs.want_running = true;
            }
            prefs.logged_out = false;
        }

        if let Some(persist) = status.persist {
            if persist != prefs.persist {
                debug!("Adopting identity from control session");
                prefs.persist = persist;
            }
        }

        if let Some(nm) = status.netmap {
            let expired = nm.key_expired(now);
            if expired {
                info!("Node key expired; blocking engine until re-login");
                state.engine_blocked = true;
            } else if state.key_expired {
                state.engine_blocked = false;
            }
            state.key_expired = expired;
            state.netmap = Some(nm);
        }

        if &prefs != state.prefs() {
            state.profiles.set_current_prefs(prefs.clone())?;
            notes.push(Notify::prefs(&prefs));
        }

        if let Some(url) = status.url {
            if state.browse_url_allowed(&url) {
                state.auth_url = Some((url.clone(), now));
                notes.push(Notify::browse_to_url(url));
            } else {
                warn!("Ignoring browse URL that does not match the control server");
            }
        }

        notes.extend(state.recompute().map(Notify::state));
        Ok(())
    }

    pub fn handle_engine_status(state: &mut BackendState, status: EngineStatus, notes: &mut Vec<Notify>) {
        if let Some(err) = &status.error {
            warn!("Engine status error: {}", err);
            return;
        }
        if status.local_endpoints != state.engine_status.local_endpoints {
            if let Some(handle) = &state.session {
                handle.session.update_endpoints(status.local_endpoints.clone());
            }
        }
        state.engine_status = status;

        if state.state == ConnectionState::Starting && state.prefs().want_running {
            notes.extend(state.recompute().map(Notify::state));
        }
    }

    pub fn handle_netinfo(state: &mut BackendState, netinfo: NetInfo) {
        if let Some(handle) = &state.session {
            handle.session.set_netinfo(netinfo);
        }
    }
}

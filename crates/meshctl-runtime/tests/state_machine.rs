//! Integration tests for the backend state machine
//!
//! Drives a backend through login, connect, disconnect, logout and profile
//! switches with scripted collaborators, checking the exact notification
//! stream and the commands each control session received.

mod common;

use common::{kinds, Fixture, STEP_TIMEOUT};
use meshctl_core::{
    BackendConfig, ConnectionState, ControlError, DataPlaneConfig, LoginFinishedPolicy, MeshError,
    MeshResult, Prefs, PrefsEdit, TimeSource, AUTH_URL_VALIDITY,
};
use meshctl_harness::{expiring_netmap, test_netmap, unauthorized_netmap};
use tokio::time::timeout;

// ----------------------------------------------------------------------------
// Full Lifecycle
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_full_login_connect_logout_sequence() -> MeshResult<()> {
    let mut fx = Fixture::new().await?;

    // Fresh profile.
    fx.backend.start().await?;
    let notes = fx.settle().await;
    assert_eq!(kinds(&notes), vec!["prefs", "state:NeedsLogin"]);
    let prefs = notes[0].prefs.as_ref().unwrap();
    assert!(prefs.logged_out);
    assert!(!prefs.want_running);
    let first = fx.session();
    assert_eq!(first.take_calls(), vec!["New"]);

    // Interactive login issues a login and waits for the URL.
    fx.backend.start_login_interactive().await?;
    assert!(fx.settle().await.is_empty());
    assert_eq!(first.take_calls(), vec!["Login"]);
    assert!(fx.backend.engine_blocked().await?);

    first.send_url("https://x/1");
    let notes = fx.settle().await;
    assert_eq!(kinds(&notes), vec!["prefs", "browse"]);
    assert_eq!(notes[1].browse_to_url.as_deref(), Some("https://x/1"));
    // The identity the session generated is reported, but never its keys.
    let reported = notes[0].prefs.as_ref().unwrap();
    assert!(reported.persist.private_node_key.is_zero());
    assert_eq!(fx.state().await, ConnectionState::NeedsLogin);

    // Authentication completes.
    first.authenticated(test_netmap());
    let notes = fx.settle().await;
    assert_eq!(kinds(&notes), vec!["login-finished", "prefs", "state:Starting"]);
    let prefs = notes[1].prefs.as_ref().unwrap();
    assert!(prefs.want_running);
    assert!(!prefs.logged_out);
    assert_eq!(prefs.persist.user_profile.login_name, "user1@example.com");
    assert!(!fx.backend.engine_blocked().await?);
    assert!(first.take_calls().is_empty());

    // A relay link means we are up.
    fx.engine.report_relay_links(1);
    assert_eq!(kinds(&fx.settle().await), vec!["state:Running"]);

    // Disconnect: state is reported before prefs and the session pauses.
    fx.set_want_running(false).await?;
    assert_eq!(kinds(&fx.settle().await), vec!["state:Stopped", "prefs"]);
    assert_eq!(first.take_calls(), vec!["pause"]);
    assert_eq!(fx.engine.last_config(), Some(DataPlaneConfig::default()));

    // Reconnect while logged in: no new login, just unpause.
    fx.set_want_running(true).await?;
    assert_eq!(kinds(&fx.settle().await), vec!["state:Starting", "prefs"]);
    assert_eq!(first.take_calls(), vec!["unpause"]);
    let config = fx.engine.last_config().unwrap();
    assert_eq!(config.wireguard.peers.len(), 1);

    // Logout.
    fx.backend.logout().await?;
    let notes = fx.settle().await;
    assert_eq!(
        kinds(&notes),
        vec!["state:Stopped", "prefs", "state:NoState", "prefs", "state:NeedsLogin"]
    );
    assert_eq!(notes[3].prefs.as_ref(), Some(&Prefs::default()));
    first.wait_shutdown().await;
    assert_eq!(first.take_calls(), vec!["pause", "Logout", "unpause", "Shutdown"]);
    assert_eq!(fx.factory.session_count(), 2);
    assert_eq!(fx.session().take_calls(), vec!["New"]);
    assert!(fx.backend.engine_blocked().await?);

    // Logging out again changes nothing.
    fx.backend.logout().await?;
    assert!(fx.settle().await.is_empty());
    assert!(fx.session().take_calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_logout_failure_is_returned_after_stop() -> MeshResult<()> {
    let mut fx = Fixture::new().await?;
    fx.to_starting().await?;
    fx.session().fail_logout(ControlError::LogoutFailed {
        reason: "server said no".into(),
    });

    let err = fx.backend.logout().await.unwrap_err();
    assert!(matches!(err, MeshError::Control(ControlError::LogoutFailed { .. })));
    // The stop phase already happened and was reported.
    assert_eq!(kinds(&fx.settle().await), vec!["state:Stopped", "prefs"]);
    assert_eq!(fx.factory.session_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_hanging_logout_is_bounded() -> MeshResult<()> {
    let mut config = BackendConfig::testing();
    config.logout_timeout_ms = 100;
    let mut fx = Fixture::with_config(config).await?;
    fx.to_starting().await?;
    fx.session().hang_logout();

    let err = timeout(STEP_TIMEOUT, fx.backend.logout())
        .await
        .expect("logout was not bounded")
        .unwrap_err();
    assert!(matches!(
        err,
        MeshError::Control(ControlError::Timeout { operation: "logout", .. })
    ));
    assert_eq!(kinds(&fx.settle().await), vec!["state:Stopped", "prefs"]);
    // Still serving commands with the original session.
    assert_eq!(fx.state().await, ConnectionState::Stopped);
    assert_eq!(fx.factory.session_count(), 1);
    Ok(())
}

// ----------------------------------------------------------------------------
// Scenarios
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_start_with_fresh_profile_emits_prefs_then_needs_login() -> MeshResult<()> {
    let mut fx = Fixture::new().await?;
    fx.backend.start().await?;
    let notes = fx.settle().await;
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[0].prefs.as_ref().map(|p| (p.logged_out, p.want_running)), Some((true, false)));
    assert_eq!(notes[1].state, Some(ConnectionState::NeedsLogin));
    assert_eq!(notes[1].sequence, notes[0].sequence + 1);
    Ok(())
}

#[tokio::test]
async fn test_browse_url_is_reused_inside_validity_window() -> MeshResult<()> {
    let mut fx = Fixture::new().await?;
    fx.to_browse_url().await?;
    let session = fx.session();
    session.take_calls();

    fx.clock.advance(AUTH_URL_VALIDITY.as_millis() as u64 - 1);
    fx.backend.start_login_interactive().await?;
    let notes = fx.settle().await;
    assert_eq!(kinds(&notes), vec!["browse"]);
    assert_eq!(notes[0].browse_to_url.as_deref(), Some("https://x/1"));
    assert!(session.take_calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_expired_browse_url_triggers_fresh_login() -> MeshResult<()> {
    let mut fx = Fixture::new().await?;
    fx.to_browse_url().await?;
    let session = fx.session();
    session.take_calls();

    fx.clock.advance(AUTH_URL_VALIDITY.as_millis() as u64);
    fx.backend.start_login_interactive().await?;
    assert!(fx.settle().await.is_empty());
    assert_eq!(session.take_calls(), vec!["Login"]);
    Ok(())
}

#[tokio::test]
async fn test_machine_authorization_gates_starting() -> MeshResult<()> {
    let mut fx = Fixture::new().await?;
    fx.to_browse_url().await?;
    let session = fx.session();

    session.authenticated(unauthorized_netmap());
    let notes = fx.settle().await;
    assert_eq!(kinds(&notes), vec!["login-finished", "prefs", "state:NeedsMachineAuth"]);
    assert_eq!(fx.engine.last_config(), Some(DataPlaneConfig::default()));

    session.send_netmap(test_netmap());
    assert_eq!(kinds(&fx.settle().await), vec!["state:Starting"]);
    Ok(())
}

#[tokio::test]
async fn test_new_profile_after_running_resets_data_plane() -> MeshResult<()> {
    let mut fx = Fixture::new().await?;
    fx.to_running().await?;
    let old = fx.session();
    assert!(fx.backend.prefs().await?.want_running);

    let id = fx.backend.new_profile().await?;
    let notes = fx.settle().await;
    assert_eq!(kinds(&notes), vec!["prefs", "state:NeedsLogin"]);
    assert_eq!(notes[0].prefs.as_ref(), Some(&Prefs::default()));
    assert_eq!(fx.engine.last_config(), Some(DataPlaneConfig::default()));
    assert!(fx.backend.engine_blocked().await?);
    old.wait_shutdown().await;
    assert_eq!(fx.factory.session_count(), 2);
    assert_eq!(fx.session().take_calls(), vec!["New"]);

    // Switching to the current profile is a no-op.
    fx.backend.switch_profile(id).await?;
    assert!(fx.settle().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_switch_back_to_logged_in_profile_logs_in_silently() -> MeshResult<()> {
    let mut fx = Fixture::new().await?;
    assert!(fx.store.keys().is_empty());
    fx.to_starting().await?;
    let stored_first = fx.backend.prefs().await?;
    let first_id = {
        let keys = fx.store.keys();
        let key = keys.iter().find(|k| k.starts_with("profile-")).unwrap().clone();
        meshctl_core::ProfileId::new(key.trim_start_matches("profile-"))
    };

    fx.backend.new_profile().await?;
    fx.settle().await;

    fx.backend.switch_profile(first_id).await?;
    let notes = fx.settle().await;
    assert_eq!(kinds(&notes), vec!["prefs", "state:NoState"]);
    assert_eq!(notes[0].prefs.as_ref(), Some(&stored_first));
    let session = fx.session();
    assert_eq!(session.take_calls(), vec!["New", "Login"]);
    assert!(!fx.backend.engine_blocked().await?);

    session.authenticated(test_netmap());
    assert_eq!(kinds(&fx.settle().await), vec!["state:Starting"]);
    Ok(())
}

#[tokio::test]
async fn test_connect_logs_in_when_session_has_not_authenticated() -> MeshResult<()> {
    let store = meshctl_core::MemStore::new();
    let mut fx = Fixture::with_store(BackendConfig::testing(), store.clone()).await?;
    fx.to_starting().await?;
    fx.set_want_running(false).await?;
    fx.backend.shutdown().await?;

    // After a restart the session holds the identity but has not completed a login.
    let mut fx = Fixture::with_store(BackendConfig::testing(), store).await?;
    fx.backend.start().await?;
    assert_eq!(kinds(&fx.settle().await), vec!["prefs", "state:Stopped"]);
    let session = fx.session();
    session.send_netmap(test_netmap());
    assert!(fx.settle().await.is_empty());
    assert_eq!(session.take_calls(), vec!["New", "Login", "pause"]);

    fx.set_want_running(true).await?;
    assert_eq!(kinds(&fx.settle().await), vec!["state:Starting", "prefs"]);
    assert_eq!(session.take_calls(), vec!["Login", "unpause"]);
    Ok(())
}

#[tokio::test]
async fn test_switch_to_unknown_profile_fails() -> MeshResult<()> {
    let mut fx = Fixture::new().await?;
    fx.backend.start().await?;
    fx.settle().await;
    let err = fx
        .backend
        .switch_profile(meshctl_core::ProfileId::new("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, MeshError::UnknownProfile { .. }));
    assert!(fx.settle().await.is_empty());
    assert_eq!(fx.factory.session_count(), 1);
    Ok(())
}

// ----------------------------------------------------------------------------
// Key Expiry
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_expired_map_blocks_until_fresh_map() -> MeshResult<()> {
    let mut fx = Fixture::new().await?;
    fx.to_running().await?;
    let session = fx.session();
    let now = fx.clock.now();

    session.send_netmap(expiring_netmap(now.saturating_sub_millis(1000)));
    assert_eq!(kinds(&fx.settle().await), vec!["state:NeedsLogin"]);
    assert!(fx.backend.engine_blocked().await?);
    assert_eq!(fx.engine.last_config(), Some(DataPlaneConfig::default()));

    session.send_netmap(expiring_netmap(now + 3_600_000));
    assert_eq!(kinds(&fx.settle().await), vec!["state:Starting"]);
    assert!(!fx.backend.engine_blocked().await?);

    fx.engine.report_relay_links(1);
    assert_eq!(kinds(&fx.settle().await), vec!["state:Running"]);
    Ok(())
}

// ----------------------------------------------------------------------------
// Preferences
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_identity_fields_cannot_be_edited() -> MeshResult<()> {
    let mut fx = Fixture::new().await?;
    fx.to_starting().await?;
    let writes = fx.store.write_count();

    let mut edit = PrefsEdit::hostname("other");
    edit.persist_set = true;
    let err = fx.backend.edit_prefs(edit).await.unwrap_err();
    assert!(matches!(err, MeshError::ProtectedField { field: "persist" }));
    assert!(err.is_caller_error());
    assert!(fx.settle().await.is_empty());
    assert_eq!(fx.store.write_count(), writes);
    Ok(())
}

#[tokio::test]
async fn test_invalid_control_url_is_rejected() -> MeshResult<()> {
    let fx = Fixture::new().await?;
    let err = fx.backend.edit_prefs(PrefsEdit::control_url("not a url")).await.unwrap_err();
    assert!(matches!(err, MeshError::InvalidPrefs { .. }));
    Ok(())
}

#[tokio::test]
async fn test_edit_returns_redacted_prefs_and_keeps_keys() -> MeshResult<()> {
    let mut fx = Fixture::new().await?;
    fx.to_starting().await?;
    let session = fx.session();
    let key_before = session.persist().private_node_key;

    let returned = fx.backend.edit_prefs(PrefsEdit::hostname("laptop")).await?;
    assert!(returned.persist.private_node_key.is_zero());
    assert_eq!(returned.hostname, "laptop");
    assert_eq!(kinds(&fx.settle().await), vec!["prefs"]);
    assert_eq!(session.take_calls(), vec!["SetHostinfo"]);
    assert_eq!(session.hostinfo().hostname, "laptop");

    // The next session starts from the stored, unredacted identity.
    fx.backend.start().await?;
    assert_eq!(fx.session().persist().private_node_key, key_before);
    Ok(())
}

#[tokio::test]
async fn test_dns_edit_reconfigures_engine() -> MeshResult<()> {
    let mut fx = Fixture::new().await?;
    fx.to_starting().await?;
    let before = fx.engine.reconfig_count();
    assert_eq!(fx.engine.last_config().unwrap().dns.search_domains, vec!["example.com"]);

    let mut edit = PrefsEdit::default();
    edit.prefs.corp_dns = false;
    edit.corp_dns_set = true;
    fx.backend.edit_prefs(edit).await?;
    assert_eq!(kinds(&fx.settle().await), vec!["prefs"]);
    assert_eq!(fx.engine.reconfig_count(), before + 1);
    let config = fx.engine.last_config().unwrap();
    assert!(config.dns.search_domains.is_empty());
    assert_eq!(config.router.routes.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_edit_without_routing_change_keeps_engine_config() -> MeshResult<()> {
    let mut fx = Fixture::new().await?;
    fx.to_starting().await?;
    let before = fx.engine.reconfig_count();

    // The test map carries no subnet routes, so accepting them changes nothing.
    fx.backend.edit_prefs(PrefsEdit::route_all(true)).await?;
    fx.settle().await;
    assert_eq!(fx.engine.reconfig_count(), before);
    Ok(())
}

#[tokio::test]
async fn test_want_running_without_session_only_reports_prefs() -> MeshResult<()> {
    let mut fx = Fixture::new().await?;
    let prefs = fx.set_want_running(true).await?;
    assert!(prefs.want_running);
    assert!(!prefs.logged_out);
    assert_eq!(kinds(&fx.settle().await), vec!["prefs"]);
    assert_eq!(fx.factory.session_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_prefs_survive_backend_restart() -> MeshResult<()> {
    let store = meshctl_core::MemStore::new();
    let mut fx = Fixture::with_store(BackendConfig::testing(), store.clone()).await?;
    fx.to_starting().await?;
    let key = fx.session().persist().private_node_key;
    fx.backend.shutdown().await?;

    let mut fx = Fixture::with_store(BackendConfig::testing(), store).await?;
    fx.backend.start().await?;
    let notes = fx.settle().await;
    assert_eq!(kinds(&notes), vec!["prefs", "state:NoState"]);
    let session = fx.session();
    assert_eq!(session.take_calls(), vec!["New", "Login"]);
    assert_eq!(session.persist().private_node_key, key);

    session.authenticated(test_netmap());
    assert_eq!(kinds(&fx.settle().await), vec!["state:Starting"]);
    Ok(())
}

// ----------------------------------------------------------------------------
// Control Status Handling
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_stale_session_status_is_ignored() -> MeshResult<()> {
    let mut fx = Fixture::new().await?;
    fx.to_starting().await?;
    let old = fx.session();
    fx.backend.logout().await?;
    fx.settle().await;

    old.send_netmap(test_netmap());
    assert!(fx.settle().await.is_empty());
    assert_eq!(fx.state().await, ConnectionState::NeedsLogin);
    assert_eq!(fx.backend.stats().await?.stale_statuses_dropped, 1);
    Ok(())
}

#[tokio::test]
async fn test_control_error_is_forwarded() -> MeshResult<()> {
    let mut fx = Fixture::new().await?;
    fx.backend.start().await?;
    fx.settle().await;

    fx.session().send_error("coordination server unreachable");
    let notes = fx.settle().await;
    assert_eq!(kinds(&notes), vec!["error"]);
    assert_eq!(notes[0].error_message.as_deref(), Some("coordination server unreachable"));
    assert_eq!(fx.state().await, ConnectionState::NeedsLogin);
    Ok(())
}

#[tokio::test]
async fn test_browse_url_for_other_host_is_not_shown() -> MeshResult<()> {
    let mut fx = Fixture::new().await?;
    fx.backend
        .edit_prefs(PrefsEdit::control_url("https://login.example.com"))
        .await?;
    fx.backend.start().await?;
    fx.backend.start_login_interactive().await?;
    let session = fx.session();
    assert_eq!(session.control_url(), "https://login.example.com");
    fx.settle().await;

    session.send_url("https://phish.example.net/a/1");
    assert_eq!(kinds(&fx.settle().await), vec!["prefs"]);

    session.send_url("https://login.example.com/a/2");
    assert_eq!(kinds(&fx.settle().await), vec!["browse"]);
    Ok(())
}

#[tokio::test]
async fn test_rejected_browse_url_is_not_reused() -> MeshResult<()> {
    let mut fx = Fixture::new().await?;
    fx.backend
        .edit_prefs(PrefsEdit::control_url("https://login.example.com"))
        .await?;
    fx.backend.start().await?;
    fx.backend.start_login_interactive().await?;
    let session = fx.session();
    fx.settle().await;

    session.send_url("https://phish.example.net/a/1");
    assert_eq!(kinds(&fx.settle().await), vec!["prefs"]);
    session.take_calls();

    // The next request goes back to the control server instead.
    fx.backend.start_login_interactive().await?;
    let notes = fx.settle().await;
    assert!(notes.iter().all(|n| n.browse_to_url.is_none()));
    assert_eq!(session.take_calls(), vec!["Login"]);
    Ok(())
}

#[tokio::test]
async fn test_session_creation_failure_is_returned() -> MeshResult<()> {
    let mut fx = Fixture::new().await?;
    fx.factory.fail_next();
    let err = fx.backend.start().await.unwrap_err();
    assert!(matches!(err, MeshError::Control(ControlError::SessionCreation { .. })));
    assert!(fx.settle().await.is_empty());

    fx.backend.start().await?;
    assert_eq!(kinds(&fx.settle().await), vec!["prefs", "state:NeedsLogin"]);
    Ok(())
}

// ----------------------------------------------------------------------------
// Compatibility Policies
// ----------------------------------------------------------------------------

fn with_policy(edit: impl FnOnce(&mut meshctl_core::CompatPolicy)) -> BackendConfig {
    let mut config = BackendConfig::testing();
    edit(&mut config.policy);
    config
}

#[tokio::test]
async fn test_login_finished_while_blocked_repeats_after_expiry() -> MeshResult<()> {
    let mut fx = Fixture::new().await?;
    fx.to_starting().await?;
    let session = fx.session();
    let now = fx.clock.now();

    session.send_netmap(expiring_netmap(now.saturating_sub_millis(1)));
    fx.settle().await;
    session.authenticated(test_netmap());
    assert_eq!(kinds(&fx.settle().await), vec!["login-finished", "state:Starting"]);
    Ok(())
}

#[tokio::test]
async fn test_login_finished_once_per_login() -> MeshResult<()> {
    let config = with_policy(|p| p.login_finished = LoginFinishedPolicy::OncePerLogin);
    let mut fx = Fixture::with_config(config).await?;
    fx.to_starting().await?;
    let session = fx.session();
    let now = fx.clock.now();

    session.send_netmap(expiring_netmap(now.saturating_sub_millis(1)));
    fx.settle().await;
    session.authenticated(test_netmap());
    assert_eq!(kinds(&fx.settle().await), vec!["state:Starting"]);
    Ok(())
}

#[tokio::test]
async fn test_prefs_before_state_policy() -> MeshResult<()> {
    let mut fx = Fixture::with_config(with_policy(|p| p.state_before_prefs = false)).await?;
    fx.to_starting().await?;
    fx.set_want_running(false).await?;
    assert_eq!(kinds(&fx.settle().await), vec!["prefs", "state:Stopped"]);
    fx.set_want_running(true).await?;
    assert_eq!(kinds(&fx.settle().await), vec!["prefs", "state:Starting"]);
    Ok(())
}

#[tokio::test]
async fn test_relogin_on_connect_policy() -> MeshResult<()> {
    let mut fx = Fixture::with_config(with_policy(|p| p.relogin_on_connect = true)).await?;
    fx.to_starting().await?;
    let session = fx.session();
    fx.set_want_running(false).await?;
    fx.settle().await;
    session.take_calls();

    fx.set_want_running(true).await?;
    fx.settle().await;
    assert_eq!(session.take_calls(), vec!["Login", "unpause"]);
    Ok(())
}

#[tokio::test]
async fn test_session_never_paused_without_pause_policy() -> MeshResult<()> {
    let mut fx = Fixture::with_config(with_policy(|p| p.pause_when_stopped = false)).await?;
    fx.to_starting().await?;
    let session = fx.session();
    session.take_calls();

    fx.set_want_running(false).await?;
    assert_eq!(kinds(&fx.settle().await), vec!["state:Stopped", "prefs"]);
    assert!(session.take_calls().is_empty());
    Ok(())
}

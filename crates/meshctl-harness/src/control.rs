//! Scripted Control Session for Testing
//!
//! `MockControl` records every command the backend issues, in order, and lets
//! a test play the coordination server: deliver browse URLs, network maps and
//! login completions through the session's observer.

use async_trait::async_trait;
use meshctl_core::{
    ControlError, ControlObserver, ControlSession, ControlSessionFactory, Hostinfo, LoginFlags, MeshError,
    MeshResult, NetInfo, NetworkMap, NodePrivateKey, Persist, SessionOptions, Status, UserProfile,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::debug;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ----------------------------------------------------------------------------
// Mock Control Session
// ----------------------------------------------------------------------------

struct Inner {
    observer: ControlObserver,
    control_url: String,
    hostinfo: Mutex<Hostinfo>,
    calls: Mutex<Vec<String>>,
    persist: Mutex<Persist>,
    auth_blocked: AtomicBool,
    logout_error: Mutex<Option<ControlError>>,
    logout_hangs: AtomicBool,
    shut_down: AtomicBool,
    shutdown_notify: Notify,
}

/// Control session driven by the test
#[derive(Clone)]
pub struct MockControl {
    inner: Arc<Inner>,
}

impl MockControl {
    fn new(opts: SessionOptions) -> Self {
        let inner = Inner {
            observer: opts.observer,
            control_url: opts.control_url,
            hostinfo: Mutex::new(opts.hostinfo),
            calls: Mutex::new(vec!["New".to_string()]),
            persist: Mutex::new(opts.persist),
            auth_blocked: AtomicBool::new(false),
            logout_error: Mutex::new(None),
            logout_hangs: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
        };
        Self { inner: Arc::new(inner) }
    }

    fn record(&self, call: &str) {
        debug!("MockControl: {}", call);
        lock(&self.inner.calls).push(call.to_string());
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Commands issued so far, clearing the record
    pub fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut *lock(&self.inner.calls))
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.inner.calls).clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner.observer.generation()
    }

    pub fn control_url(&self) -> String {
        self.inner.control_url.clone()
    }

    pub fn hostinfo(&self) -> Hostinfo {
        lock(&self.inner.hostinfo).clone()
    }

    pub fn persist(&self) -> Persist {
        lock(&self.inner.persist).clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// Resolve once `shutdown` has been called
    pub async fn wait_shutdown(&self) {
        while !self.is_shut_down() {
            self.inner.shutdown_notify.notified().await;
        }
    }

    /// Make the next logout fail with `err`
    pub fn fail_logout(&self, err: ControlError) {
        *lock(&self.inner.logout_error) = Some(err);
    }

    /// Make every later logout wait forever for the server
    pub fn hang_logout(&self) {
        self.inner.logout_hangs.store(true, Ordering::SeqCst);
    }

    // ------------------------------------------------------------------------
    // Server Side
    // ------------------------------------------------------------------------

    /// Deliver a status carrying the session's current identity
    pub fn send(&self, url: Option<&str>, login_finished: bool, netmap: Option<NetworkMap>) {
        self.inner.observer.send_status(Status {
            error: None,
            url: url.map(str::to_string),
            login_finished,
            netmap,
            persist: Some(self.persist()),
        });
    }

    /// Ask the user to visit `url`
    pub fn send_url(&self, url: &str) {
        self.send(Some(url), false, None);
    }

    pub fn send_netmap(&self, nm: NetworkMap) {
        self.send(None, false, Some(nm));
    }

    pub fn send_error(&self, message: &str) {
        self.inner.observer.send_status(Status {
            error: Some(message.to_string()),
            ..Default::default()
        });
    }

    /// Complete authentication as the owner of `nm`'s self node
    pub fn authenticated(&self, nm: NetworkMap) {
        {
            let mut persist = lock(&self.inner.persist);
            persist.user_profile = nm.self_user_profile().cloned().unwrap_or_else(|| UserProfile {
                login_name: "user1@example.com".to_string(),
                ..Default::default()
            });
            if let Some(id) = nm.node_id() {
                persist.node_id = id.clone();
            }
        }
        self.inner.auth_blocked.store(false, Ordering::SeqCst);
        self.send(None, true, Some(nm));
    }
}

#[async_trait]
impl ControlSession for MockControl {
    fn login(&self, flags: LoginFlags) {
        self.record("Login");
        let new_keys = {
            let mut persist = lock(&self.inner.persist);
            if persist.private_node_key.is_zero() {
                persist.private_node_key = NodePrivateKey::generate();
                true
            } else {
                false
            }
        };
        self.inner
            .auth_blocked
            .store(flags.interactive || new_keys, Ordering::SeqCst);
    }

    async fn logout(&self) -> Result<(), ControlError> {
        self.record("Logout");
        if self.inner.logout_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(err) = lock(&self.inner.logout_error).take() {
            return Err(err);
        }
        *lock(&self.inner.persist) = Persist::default();
        self.inner.auth_blocked.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn set_paused(&self, paused: bool) {
        self.record(if paused { "pause" } else { "unpause" });
    }

    fn shutdown(&self) {
        self.record("Shutdown");
        self.inner.shut_down.store(true, Ordering::SeqCst);
        self.inner.shutdown_notify.notify_waiters();
        self.inner.shutdown_notify.notify_one();
    }

    fn auth_can_continue(&self) -> bool {
        !self.inner.auth_blocked.load(Ordering::SeqCst)
    }

    fn set_hostinfo(&self, hostinfo: Hostinfo) {
        self.record("SetHostinfo");
        *lock(&self.inner.hostinfo) = hostinfo;
    }

    fn set_netinfo(&self, _netinfo: NetInfo) {
        self.record("SetNetInfo");
    }

    fn update_endpoints(&self, _endpoints: Vec<SocketAddr>) {
        self.record("UpdateEndpoints");
    }
}

// ----------------------------------------------------------------------------
// Factory
// ----------------------------------------------------------------------------

/// Creates `MockControl` sessions and keeps every one for inspection
#[derive(Clone, Default)]
pub struct MockControlFactory {
    sessions: Arc<Mutex<Vec<MockControl>>>,
    fail_next: Arc<AtomicBool>,
}

impl MockControlFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session created `index`-th, counting from zero
    ///
    /// Panics if fewer sessions exist.
    pub fn session(&self, index: usize) -> MockControl {
        lock(&self.sessions)[index].clone()
    }

    /// Most recently created session
    ///
    /// Panics if none exist.
    pub fn latest(&self) -> MockControl {
        let sessions = lock(&self.sessions);
        sessions[sessions.len() - 1].clone()
    }

    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Make the next session creation fail
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl ControlSessionFactory for MockControlFactory {
    fn new_session(&self, opts: SessionOptions) -> MeshResult<Box<dyn ControlSession>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(MeshError::Control(ControlError::SessionCreation {
                reason: "injected failure".to_string(),
            }));
        }
        let session = MockControl::new(opts);
        lock(&self.sessions).push(session.clone());
        Ok(Box::new(session))
    }
}

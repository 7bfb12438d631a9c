//! Backend Builder API
//!
//! Wires a control-session factory, an engine, a state store and a clock
//! into a running backend task and returns a cloneable handle to it.

use crate::channels::{create_inbox, inbox_event_sink, Command, InboxSender, Inbound};
use crate::logic::{BackendState, BackendStats, BackendTask, Collaborators};
use crate::notifier::Subscription;
use meshctl_core::{
    BackendConfig, ConnectionState, ControlSessionFactory, Engine, EngineStatusSink, MemStore, MeshError,
    MeshResult, Prefs, PrefsEdit, ProfileId, StateStore, SystemTimeSource, TimeSource,
};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::info;

// ----------------------------------------------------------------------------
// Backend Builder
// ----------------------------------------------------------------------------

/// Builder for a backend instance
pub struct BackendBuilder {
    config: BackendConfig,
    factory: Arc<dyn ControlSessionFactory>,
    engine: Arc<dyn Engine>,
    store: Option<Arc<dyn StateStore>>,
    clock: Option<Arc<dyn TimeSource>>,
}

impl BackendBuilder {
    pub fn new(factory: Arc<dyn ControlSessionFactory>, engine: Arc<dyn Engine>) -> Self {
        Self {
            config: BackendConfig::default(),
            factory,
            engine,
            store: None,
            clock: None,
        }
    }

    pub fn with_config(mut self, config: BackendConfig) -> Self {
        self.config = config;
        self
    }

    /// Persistent store for profiles; defaults to an in-memory store
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_time_source(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Load profiles and spawn the backend task
    ///
    /// Must be called from within a tokio runtime.
    pub fn build_and_start(self) -> MeshResult<BackendHandle> {
        self.config.validate()?;
        let (inbox, receiver) = create_inbox();
        let sink = inbox_event_sink(&inbox);
        self.engine.set_status_callback(EngineStatusSink::new(sink.clone()));

        let deps = Collaborators {
            store: self.store.unwrap_or_else(|| Arc::new(MemStore::new())),
            factory: self.factory,
            engine: self.engine,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemTimeSource)),
            sink,
        };
        let state = BackendState::new(self.config, deps)?;
        let mut task = BackendTask::new(state, receiver);
        tokio::spawn(async move { task.run().await });

        info!("Backend started");
        Ok(BackendHandle { inbox })
    }
}

// ----------------------------------------------------------------------------
// Backend Handle
// ----------------------------------------------------------------------------

/// Handle to a running backend; the task ends when every clone is dropped
#[derive(Clone, Debug)]
pub struct BackendHandle {
    inbox: InboxSender,
}

impl BackendHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> MeshResult<T> {
        let (reply, response) = oneshot::channel();
        self.inbox
            .send(Inbound::Command(make(reply)))
            .map_err(|_| MeshError::Channel {
                message: "Backend task is not running".to_string(),
            })?;
        response.await.map_err(|_| MeshError::Channel {
            message: "Backend task dropped the reply".to_string(),
        })
    }

    /// Create a control session from the current profile and report state
    pub async fn start(&self) -> MeshResult<()> {
        self.request(|reply| Command::Start { reply }).await?
    }

    /// Apply a preferences edit; returns the resulting preferences, redacted
    pub async fn edit_prefs(&self, edit: PrefsEdit) -> MeshResult<Prefs> {
        self.request(|reply| Command::EditPrefs { edit, reply }).await?
    }

    pub async fn start_login_interactive(&self) -> MeshResult<()> {
        self.request(|reply| Command::StartLoginInteractive { reply }).await?
    }

    pub async fn logout(&self) -> MeshResult<()> {
        self.request(|reply| Command::Logout { reply }).await?
    }

    pub async fn new_profile(&self) -> MeshResult<ProfileId> {
        self.request(|reply| Command::NewProfile { reply }).await?
    }

    pub async fn switch_profile(&self, id: ProfileId) -> MeshResult<()> {
        self.request(|reply| Command::SwitchProfile { id, reply }).await?
    }

    /// Subscribe to notifications, replacing any previous subscriber
    pub async fn subscribe(&self) -> MeshResult<Subscription> {
        self.request(|reply| Command::Subscribe { reply }).await
    }

    pub fn unsubscribe(&self) -> MeshResult<()> {
        self.inbox
            .send(Inbound::Command(Command::Unsubscribe))
            .map_err(|_| MeshError::Channel {
                message: "Backend task is not running".to_string(),
            })
    }

    pub async fn state(&self) -> MeshResult<ConnectionState> {
        self.request(|reply| Command::GetState { reply }).await
    }

    pub async fn prefs(&self) -> MeshResult<Prefs> {
        self.request(|reply| Command::GetPrefs { reply }).await
    }

    /// Whether the engine is held on the zero config awaiting authentication
    pub async fn engine_blocked(&self) -> MeshResult<bool> {
        self.request(|reply| Command::GetEngineBlocked { reply }).await
    }

    pub async fn stats(&self) -> MeshResult<BackendStats> {
        self.request(|reply| Command::GetStats { reply }).await
    }

    /// Stop the backend task and shut the current session down
    pub async fn shutdown(&self) -> MeshResult<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    pub fn is_running(&self) -> bool {
        !self.inbox.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshctl_harness::{MockControlFactory, MockEngine};
    use std::time::Duration;

    fn builder() -> (BackendBuilder, MockControlFactory, MockEngine) {
        let factory = MockControlFactory::new();
        let engine = MockEngine::new();
        let builder = BackendBuilder::new(Arc::new(factory.clone()), Arc::new(engine.clone()))
            .with_config(BackendConfig::testing());
        (builder, factory, engine)
    }

    #[tokio::test]
    async fn test_builder_registers_engine_callback() {
        let (builder, _factory, engine) = builder();
        let backend = builder.build_and_start().unwrap();
        assert!(engine.has_status_callback());
        assert_eq!(backend.state().await.unwrap(), ConnectionState::NoState);
        backend.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let (builder, factory, _engine) = builder();
        let backend = builder.build_and_start().unwrap();
        backend.start().await.unwrap();
        backend.shutdown().await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            while backend.is_running() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("backend task did not stop");
        assert!(matches!(backend.state().await, Err(MeshError::Channel { .. })));

        tokio::time::timeout(Duration::from_secs(1), factory.session(0).wait_shutdown())
            .await
            .expect("session was not shut down");
    }

    #[tokio::test]
    async fn test_commands_before_start_report_no_session() {
        let (builder, _factory, _engine) = builder();
        let backend = builder.build_and_start().unwrap();
        let err = backend.start_login_interactive().await.unwrap_err();
        assert!(matches!(err, MeshError::NoSession));
        let err = backend.logout().await.unwrap_err();
        assert!(matches!(err, MeshError::NoSession));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_spawning() {
        let (builder, _factory, engine) = builder();
        let mut config = BackendConfig::testing();
        config.tunnel_name.clear();
        let err = builder.with_config(config).build_and_start().unwrap_err();
        assert!(matches!(err, MeshError::Configuration { .. }));
        assert!(!engine.has_status_callback());
    }
}

//! Shared fixture for backend integration tests

#![allow(dead_code)]

use meshctl_core::{BackendConfig, ConnectionState, MemStore, MeshResult, Notify, Prefs, PrefsEdit};
use meshctl_harness::{test_netmap, MockControl, MockControlFactory, MockEngine, MockTimeSource};
use meshctl_runtime::{BackendBuilder, BackendHandle, Subscription};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub struct Fixture {
    pub backend: BackendHandle,
    pub sub: Subscription,
    pub factory: MockControlFactory,
    pub engine: MockEngine,
    pub clock: MockTimeSource,
    pub store: MemStore,
}

impl Fixture {
    pub async fn new() -> MeshResult<Self> {
        Self::with_config(BackendConfig::testing()).await
    }

    pub async fn with_config(config: BackendConfig) -> MeshResult<Self> {
        Self::with_store(config, MemStore::new()).await
    }

    pub async fn with_store(config: BackendConfig, store: MemStore) -> MeshResult<Self> {
        init_tracing();
        let factory = MockControlFactory::new();
        let engine = MockEngine::new();
        let clock = MockTimeSource::default();
        let backend = BackendBuilder::new(Arc::new(factory.clone()), Arc::new(engine.clone()))
            .with_config(config)
            .with_store(Arc::new(store.clone()))
            .with_time_source(Arc::new(clock.clone()))
            .build_and_start()?;
        let sub = backend.subscribe().await?;
        Ok(Self {
            backend,
            sub,
            factory,
            engine,
            clock,
            store,
        })
    }

    pub fn session(&self) -> MockControl {
        self.factory.latest()
    }

    /// Wait until every input posted so far is handled, then take the
    /// notifications it produced
    pub async fn settle(&mut self) -> Vec<Notify> {
        // The inbox is ordered, so a query reply implies earlier events were
        // handled and their notifications flushed.
        timeout(STEP_TIMEOUT, self.backend.stats())
            .await
            .expect("backend did not settle")
            .expect("backend is gone");
        self.sub.drain()
    }

    pub async fn state(&self) -> ConnectionState {
        self.backend.state().await.expect("backend is gone")
    }

    /// start, interactive login, browse URL
    pub async fn to_browse_url(&mut self) -> MeshResult<()> {
        self.backend.start().await?;
        self.backend.start_login_interactive().await?;
        self.session().send_url("https://x/1");
        self.settle().await;
        Ok(())
    }

    /// Fully logged in with a map and no relay link yet
    pub async fn to_starting(&mut self) -> MeshResult<()> {
        self.to_browse_url().await?;
        self.session().authenticated(test_netmap());
        self.settle().await;
        assert_eq!(self.state().await, ConnectionState::Starting);
        Ok(())
    }

    pub async fn to_running(&mut self) -> MeshResult<()> {
        self.to_starting().await?;
        self.engine.report_relay_links(1);
        self.settle().await;
        assert_eq!(self.state().await, ConnectionState::Running);
        Ok(())
    }

    pub async fn set_want_running(&self, want: bool) -> MeshResult<Prefs> {
        self.backend.edit_prefs(PrefsEdit::want_running(want)).await
    }
}

/// Labels of `notes`, with the state spelled out
pub fn kinds(notes: &[Notify]) -> Vec<String> {
    notes
        .iter()
        .map(|n| match n.state {
            Some(state) => format!("state:{}", state),
            None => n.kind().to_string(),
        })
        .collect()
}

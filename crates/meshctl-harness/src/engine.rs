//! Recording Engine for Testing

use meshctl_core::{
    DataPlaneConfig, DnsConfig, Engine, EngineError, EngineStatus, EngineStatusSink, RouterConfig,
    WireGuardConfig,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Default)]
struct Inner {
    configs: Vec<DataPlaneConfig>,
    fail_next: bool,
    sink: Option<EngineStatusSink>,
}

/// Engine that keeps every configuration it is handed
#[derive(Clone, Default)]
pub struct MockEngine {
    inner: Arc<Mutex<Inner>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Successfully applied configurations, oldest first
    pub fn configs(&self) -> Vec<DataPlaneConfig> {
        self.lock().configs.clone()
    }

    pub fn last_config(&self) -> Option<DataPlaneConfig> {
        self.lock().configs.last().cloned()
    }

    pub fn reconfig_count(&self) -> usize {
        self.lock().configs.len()
    }

    /// Make the next reconfiguration fail
    pub fn fail_next_reconfig(&self) {
        self.lock().fail_next = true;
    }

    pub fn has_status_callback(&self) -> bool {
        self.lock().sink.is_some()
    }

    /// Callback the backend registered
    ///
    /// Panics if none was registered.
    pub fn status_sink(&self) -> EngineStatusSink {
        match &self.lock().sink {
            Some(sink) => sink.clone(),
            None => panic!("no engine status callback registered"),
        }
    }

    pub fn report(&self, status: EngineStatus) {
        self.status_sink().report(status);
    }

    pub fn report_relay_links(&self, relay_links: u32) {
        self.report(EngineStatus {
            relay_links,
            ..Default::default()
        });
    }
}

impl Engine for MockEngine {
    fn reconfig(&self, wg: &WireGuardConfig, router: &RouterConfig, dns: &DnsConfig) -> Result<(), EngineError> {
        let mut inner = self.lock();
        if std::mem::take(&mut inner.fail_next) {
            return Err(EngineError::ReconfigFailed {
                reason: "injected failure".to_string(),
            });
        }
        debug!("MockEngine: reconfig with {} peer(s)", wg.peers.len());
        inner.configs.push(DataPlaneConfig {
            wireguard: wg.clone(),
            router: router.clone(),
            dns: dns.clone(),
        });
        Ok(())
    }

    fn set_status_callback(&self, sink: EngineStatusSink) {
        self.lock().sink = Some(sink);
    }
}

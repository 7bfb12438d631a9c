//! Preferences storage
//!
//! The backend persists profiles as opaque byte blobs under string keys.

use crate::errors::StoreError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Key under which the current profile id is stored
pub const CURRENT_PROFILE_KEY: &str = "_current-profile";

/// Key of a profile's preference blob
pub fn profile_key(id: &crate::types::ProfileId) -> String {
    format!("profile-{}", id)
}

/// Key-value persistence for backend state
pub trait StateStore: Send + Sync {
    fn read_state(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn write_state(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
}

/// In-memory store, also useful to inspect writes in tests
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    writes: Arc<Mutex<u64>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> u64 {
        self.writes.lock().map(|w| *w).unwrap_or(0)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

impl StateStore for MemStore {
    fn read_state(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::ReadFailed {
            key: key.to_string(),
            reason: "store lock poisoned".to_string(),
        })?;
        Ok(entries.get(key).cloned())
    }

    fn write_state(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let poisoned = || StoreError::WriteFailed {
            key: key.to_string(),
            reason: "store lock poisoned".to_string(),
        };
        self.entries
            .lock()
            .map_err(|_| poisoned())?
            .insert(key.to_string(), value.to_vec());
        *self.writes.lock().map_err(|_| poisoned())? += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_store_round_trip_counts_writes() {
        let store = MemStore::new();
        assert_eq!(store.read_state("k").unwrap(), None);
        store.write_state("k", b"v").unwrap();
        assert_eq!(store.read_state("k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.keys(), vec!["k".to_string()]);
    }
}

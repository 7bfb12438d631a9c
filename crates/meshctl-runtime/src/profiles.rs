//! Login profiles
//!
//! Each profile is one `Prefs` record stored under `profile-<id>`; the
//! current profile id is stored under `_current-profile`. Every write goes to
//! the store before memory is updated, so a failed write leaves the manager
//! unchanged.

use meshctl_core::store::{profile_key, CURRENT_PROFILE_KEY};
use meshctl_core::{MeshError, MeshResult, Prefs, ProfileId, StateStore, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub struct ProfileManager {
    store: Arc<dyn StateStore>,
    current: ProfileId,
    prefs: Prefs,
    /// Profiles other than the current one seen during this run
    others: HashMap<ProfileId, Prefs>,
}

impl ProfileManager {
    /// Load the current profile from `store`, or start an unsaved fresh one
    pub fn load(store: Arc<dyn StateStore>) -> MeshResult<Self> {
        let current = match store.read_state(CURRENT_PROFILE_KEY)? {
            Some(bytes) => {
                let id = String::from_utf8(bytes).map_err(|e| StoreError::Corrupt {
                    key: CURRENT_PROFILE_KEY.to_string(),
                    reason: e.to_string(),
                })?;
                ProfileId::new(id)
            }
            None => ProfileId::generate(),
        };
        let prefs = Self::read_profile(store.as_ref(), &current)?.unwrap_or_default();
        info!("Loaded profile {}", current);

        Ok(Self {
            store,
            current,
            prefs,
            others: HashMap::new(),
        })
    }

    fn read_profile(store: &dyn StateStore, id: &ProfileId) -> MeshResult<Option<Prefs>> {
        match store.read_state(&profile_key(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn current_id(&self) -> &ProfileId {
        &self.current
    }

    pub fn current_prefs(&self) -> &Prefs {
        &self.prefs
    }

    pub fn known_profiles(&self) -> Vec<ProfileId> {
        let mut ids: Vec<ProfileId> = self.others.keys().cloned().collect();
        ids.push(self.current.clone());
        ids.sort();
        ids
    }

    /// Persist and adopt new preferences for the current profile
    pub fn set_current_prefs(&mut self, prefs: Prefs) -> MeshResult<()> {
        let bytes = serde_json::to_vec(&prefs)?;
        self.store.write_state(&profile_key(&self.current), &bytes)?;
        self.store
            .write_state(CURRENT_PROFILE_KEY, self.current.as_str().as_bytes())?;
        self.prefs = prefs;
        Ok(())
    }

    /// Replace the current profile's preferences with a fresh logged-out set
    pub fn reset_current(&mut self) -> MeshResult<()> {
        debug!("Resetting preferences of profile {}", self.current);
        self.set_current_prefs(Prefs::default())
    }

    /// Create an empty profile and make it current
    pub fn new_profile(&mut self) -> MeshResult<ProfileId> {
        let id = ProfileId::generate();
        self.store
            .write_state(CURRENT_PROFILE_KEY, id.as_str().as_bytes())?;
        self.make_current(id.clone(), Prefs::default());
        info!("Created profile {}", id);
        Ok(id)
    }

    /// Make an existing profile current
    pub fn switch_to(&mut self, id: &ProfileId) -> MeshResult<()> {
        if id == &self.current {
            return Ok(());
        }
        let prefs = match self.others.get(id) {
            Some(prefs) => prefs.clone(),
            None => Self::read_profile(self.store.as_ref(), id)?
                .ok_or_else(|| MeshError::UnknownProfile { id: id.to_string() })?,
        };
        self.store
            .write_state(CURRENT_PROFILE_KEY, id.as_str().as_bytes())?;
        self.others.remove(id);
        self.make_current(id.clone(), prefs);
        info!("Switched to profile {}", id);
        Ok(())
    }

    fn make_current(&mut self, id: ProfileId, prefs: Prefs) {
        let old_id = std::mem::replace(&mut self.current, id);
        let old_prefs = std::mem::replace(&mut self.prefs, prefs);
        self.others.insert(old_id, old_prefs);
    }
}

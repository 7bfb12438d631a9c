//! Preferences and masked preference edits
//!
//! `Prefs` is the persistent per-profile settings record. `PrefsEdit` is the
//! partial-update wire shape: a `Prefs` value plus one `*_set` flag per
//! editable field, of which only the flagged fields are applied.

use crate::errors::{MeshError, MeshResult};
use crate::netmap::UserProfile;
use crate::types::{NetworkLockKey, NodePrivateKey, StableNodeId};
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Persist
// ----------------------------------------------------------------------------

/// Node identity persisted across restarts, owned by the control session
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Persist {
    pub private_node_key: NodePrivateKey,
    /// Previous node key, kept while a rotation is in flight
    pub old_private_node_key: NodePrivateKey,
    pub node_id: StableNodeId,
    pub user_profile: UserProfile,
    pub network_lock_key: NetworkLockKey,
}

impl Persist {
    /// Copy with all private key material zeroed
    pub fn redacted(&self) -> Self {
        Self {
            private_node_key: NodePrivateKey::default(),
            old_private_node_key: NodePrivateKey::default(),
            network_lock_key: NetworkLockKey::default(),
            ..self.clone()
        }
    }
}

// ----------------------------------------------------------------------------
// Prefs
// ----------------------------------------------------------------------------

/// Per-profile user preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prefs {
    /// Coordination server URL; empty means the configured default
    pub control_url: String,
    /// Accept subnet routes advertised by peers
    pub route_all: bool,
    pub exit_node_id: Option<StableNodeId>,
    /// Use the tailnet's DNS configuration
    pub corp_dns: bool,
    pub want_running: bool,
    pub logged_out: bool,
    pub hostname: String,
    /// Disable source NAT of traffic to advertised subnets
    pub no_snat: bool,
    pub persist: Persist,
}

impl Default for Prefs {
    /// A brand-new profile has never logged in
    fn default() -> Self {
        Self {
            control_url: String::new(),
            route_all: false,
            exit_node_id: None,
            corp_dns: true,
            want_running: false,
            logged_out: true,
            hostname: String::new(),
            no_snat: false,
            persist: Persist::default(),
        }
    }
}

impl Prefs {
    /// Whether this profile holds a node key from a previous login
    pub fn has_node_key(&self) -> bool {
        !self.persist.private_node_key.is_zero()
    }

    /// Copy safe to hand to subscribers and callers: no private keys
    pub fn redacted(&self) -> Self {
        Self {
            persist: self.persist.redacted(),
            ..self.clone()
        }
    }

    /// Control URL, falling back to `default_url` when unset
    pub fn control_url_or<'a>(&'a self, default_url: &'a str) -> &'a str {
        if self.control_url.is_empty() {
            default_url
        } else {
            &self.control_url
        }
    }

    /// Whether any field feeding the data-plane translation differs
    pub fn routing_differs(&self, other: &Prefs) -> bool {
        self.route_all != other.route_all
            || self.exit_node_id != other.exit_node_id
            || self.corp_dns != other.corp_dns
            || self.no_snat != other.no_snat
    }
}

// ----------------------------------------------------------------------------
// Masked Edits
// ----------------------------------------------------------------------------

/// Partial preferences update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrefsEdit {
    pub prefs: Prefs,
    pub control_url_set: bool,
    pub route_all_set: bool,
    pub exit_node_id_set: bool,
    pub corp_dns_set: bool,
    pub want_running_set: bool,
    pub logged_out_set: bool,
    pub hostname_set: bool,
    pub no_snat_set: bool,
    /// Identity is owned by the control session; edits setting this are rejected
    pub persist_set: bool,
}

impl PrefsEdit {
    pub fn want_running(want: bool) -> Self {
        let mut edit = Self::default();
        edit.prefs.want_running = want;
        edit.want_running_set = true;
        edit
    }

    pub fn control_url(url: impl Into<String>) -> Self {
        let mut edit = Self::default();
        edit.prefs.control_url = url.into();
        edit.control_url_set = true;
        edit
    }

    pub fn route_all(accept: bool) -> Self {
        let mut edit = Self::default();
        edit.prefs.route_all = accept;
        edit.route_all_set = true;
        edit
    }

    pub fn exit_node(id: Option<StableNodeId>) -> Self {
        let mut edit = Self::default();
        edit.prefs.exit_node_id = id;
        edit.exit_node_id_set = true;
        edit
    }

    pub fn hostname(name: impl Into<String>) -> Self {
        let mut edit = Self::default();
        edit.prefs.hostname = name.into();
        edit.hostname_set = true;
        edit
    }

    /// Reject edits touching protected fields and malformed values
    pub fn validate(&self) -> MeshResult<()> {
        if self.persist_set {
            return Err(MeshError::ProtectedField { field: "persist" });
        }
        if self.control_url_set && !self.prefs.control_url.is_empty() {
            url::Url::parse(&self.prefs.control_url).map_err(|e| MeshError::InvalidPrefs {
                reason: format!("control URL {:?}: {}", self.prefs.control_url, e),
            })?;
        }
        Ok(())
    }

    /// Merge the flagged fields into a copy of `base`
    pub fn apply_to(&self, base: &Prefs) -> Prefs {
        let mut out = base.clone();
        let p = &self.prefs;
        if self.control_url_set {
            out.control_url = p.control_url.clone();
        }
        if self.route_all_set {
            out.route_all = p.route_all;
        }
        if self.exit_node_id_set {
            out.exit_node_id = p.exit_node_id.clone();
        }
        if self.corp_dns_set {
            out.corp_dns = p.corp_dns;
        }
        if self.logged_out_set {
            out.logged_out = p.logged_out;
        }
        if self.want_running_set {
            out.want_running = p.want_running;
        }
        if self.hostname_set {
            out.hostname = p.hostname.clone();
        }
        if self.no_snat_set {
            out.no_snat = p.no_snat;
        }
        // Running implies logged in.
        if out.want_running {
            out.logged_out = false;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed_prefs() -> Prefs {
        Prefs {
            persist: Persist {
                private_node_key: NodePrivateKey::generate(),
                old_private_node_key: NodePrivateKey::generate(),
                network_lock_key: NetworkLockKey::generate(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_fresh_prefs_are_logged_out_and_stopped() {
        let prefs = Prefs::default();
        assert!(prefs.logged_out);
        assert!(!prefs.want_running);
        assert!(!prefs.has_node_key());
    }

    #[test]
    fn test_only_flagged_fields_apply() {
        let base = keyed_prefs();
        let mut edit = PrefsEdit::hostname("desk");
        edit.prefs.control_url = "https://ignored.example".into();
        let out = edit.apply_to(&base);
        assert_eq!(out.hostname, "desk");
        assert_eq!(out.control_url, "");
        assert_eq!(out.persist, base.persist);
    }

    #[test]
    fn test_want_running_clears_logged_out() {
        let out = PrefsEdit::want_running(true).apply_to(&Prefs::default());
        assert!(out.want_running);
        assert!(!out.logged_out);
    }

    #[test]
    fn test_persist_edit_is_rejected() {
        let mut edit = PrefsEdit::default();
        edit.persist_set = true;
        assert!(matches!(edit.validate(), Err(MeshError::ProtectedField { field: "persist" })));
    }

    #[test]
    fn test_bad_control_url_is_rejected() {
        assert!(PrefsEdit::control_url("not a url").validate().is_err());
        assert!(PrefsEdit::control_url("https://localhost:1/").validate().is_ok());
        assert!(PrefsEdit::control_url("").validate().is_ok());
    }

    #[test]
    fn test_redacted_prefs_carry_no_keys() {
        let prefs = keyed_prefs();
        let redacted = prefs.redacted();
        assert!(redacted.persist.private_node_key.is_zero());
        assert!(redacted.persist.old_private_node_key.is_zero());
        assert!(redacted.persist.network_lock_key.is_zero());
        assert!(prefs.has_node_key());
    }
}

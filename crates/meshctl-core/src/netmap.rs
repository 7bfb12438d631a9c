//! Network map model
//!
//! The authoritative topology snapshot delivered by the coordination service:
//! the self node, its peers, the relay map and the tailnet's user profiles.

use crate::types::{DiscoPublicKey, NodeId, NodePublicKey, StableNodeId, Timestamp, UserId};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Node capability granting data-plane audit logging
pub const CAP_DATA_PLANE_AUDIT_LOGS: &str = "audit-log";

/// Node capability requesting that exit traffic flows are logged as well
pub const CAP_LOG_EXIT_FLOWS: &str = "audit-log:exit-flows";

// ----------------------------------------------------------------------------
// Nodes
// ----------------------------------------------------------------------------

/// A node in the tailnet, either ourselves or a peer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub stable_id: StableNodeId,
    /// Fully qualified DNS name
    pub name: String,
    pub user: UserId,
    pub key: NodePublicKey,
    pub key_expiry: Option<Timestamp>,
    /// Set by the coordination service once the node key has expired
    pub expired: bool,
    pub disco_key: Option<DiscoPublicKey>,
    /// Home relay region, 0 when unknown
    pub home_relay: u16,
    /// Plain WireGuard peer that speaks no discovery protocol
    pub is_wireguard_only: bool,
    /// Tailnet addresses of the node
    pub addresses: Vec<IpNet>,
    /// Prefixes this node may send from
    pub allowed_ips: Vec<IpNet>,
    /// Subnets this node is the authoritative router for
    pub primary_routes: Vec<IpNet>,
    pub tags: Vec<String>,
    pub capabilities: Vec<String>,
    pub machine_authorized: bool,
    /// Private audit log id of this node, hex encoded
    pub audit_log_id: String,
    pub self_node_v4_masq_addr: Option<Ipv4Addr>,
    pub self_node_v6_masq_addr: Option<Ipv6Addr>,
    pub is_jailed: bool,
}

impl Node {
    pub fn has_cap(&self, cap: &str) -> bool {
        self.capabilities.iter().any(|c| c == cap)
    }

    /// Whether the node has expired at `now`
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expired || self.key_expiry.map_or(false, |expiry| expiry <= now)
    }

    /// Whether the node is reachable at all: disco, home relay or raw WireGuard
    pub fn is_reachable(&self) -> bool {
        self.disco_key.map_or(false, |k| !k.is_zero()) || self.home_relay != 0 || self.is_wireguard_only
    }

    /// Short name for log lines: the first DNS label, or the key prefix
    pub fn display_name(&self) -> String {
        match self.name.split('.').next() {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => self.key.short_string(),
        }
    }

    pub fn shares_tag_with(&self, other: &Node) -> bool {
        self.tags.iter().any(|t| other.tags.contains(t))
    }
}

// ----------------------------------------------------------------------------
// Relay Map
// ----------------------------------------------------------------------------

/// A relay server within a region
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelayNode {
    pub name: String,
    pub region_id: u16,
    pub host_name: String,
}

/// A geographic relay region
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelayRegion {
    pub region_id: u16,
    pub region_code: String,
    pub nodes: Vec<RelayNode>,
}

/// Relay regions keyed by region id
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelayMap {
    pub regions: BTreeMap<u16, RelayRegion>,
}

// ----------------------------------------------------------------------------
// Network Map
// ----------------------------------------------------------------------------

/// Login and display information of a tailnet user
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub login_name: String,
    pub display_name: String,
}

/// Topology snapshot, replaced wholesale on every update
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkMap {
    pub self_node: Option<Node>,
    pub peers: Vec<Node>,
    pub relay_map: RelayMap,
    /// Expiry of our own node key
    pub expiry: Option<Timestamp>,
    pub user_profiles: HashMap<UserId, UserProfile>,
    /// Tailnet domain, used as the DNS search domain
    pub domain: String,
    /// Private audit log id of the tailnet, hex encoded
    pub domain_audit_log_id: String,
}

impl NetworkMap {
    /// Our own tailnet addresses
    pub fn addresses(&self) -> &[IpNet] {
        self.self_node.as_ref().map_or(&[], |n| n.addresses.as_slice())
    }

    pub fn node_id(&self) -> Option<&StableNodeId> {
        self.self_node.as_ref().map(|n| &n.stable_id)
    }

    /// Unknown self node counts as not authorized
    pub fn machine_authorized(&self) -> bool {
        self.self_node.as_ref().map_or(false, |n| n.machine_authorized)
    }

    pub fn key_expired(&self, now: Timestamp) -> bool {
        self.expiry.map_or(false, |expiry| expiry <= now)
    }

    /// Profile of the user owning the self node
    pub fn self_user_profile(&self) -> Option<&UserProfile> {
        let user = self.self_node.as_ref()?.user;
        self.user_profiles.get(&user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_self_node_is_not_authorized() {
        let nm = NetworkMap::default();
        assert!(!nm.machine_authorized());
        assert!(nm.addresses().is_empty());
    }

    #[test]
    fn test_key_expiry_is_inclusive() {
        let nm = NetworkMap {
            expiry: Some(Timestamp::new(100)),
            ..Default::default()
        };
        assert!(nm.key_expired(Timestamp::new(100)));
        assert!(!nm.key_expired(Timestamp::new(99)));
    }

    #[test]
    fn test_reachability_requires_a_path() {
        let mut node = Node::default();
        assert!(!node.is_reachable());
        node.home_relay = 3;
        assert!(node.is_reachable());
        node.home_relay = 0;
        node.is_wireguard_only = true;
        assert!(node.is_reachable());
    }

    #[test]
    fn test_display_name_falls_back_to_key() {
        let mut node = Node::default();
        node.name = "laptop.example.ts.net".into();
        assert_eq!(node.display_name(), "laptop");
        node.name.clear();
        assert_eq!(node.display_name(), "00000000");
    }
}

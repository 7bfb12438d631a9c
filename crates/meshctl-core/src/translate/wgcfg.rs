//! WireGuard configuration from a network map
//!
//! Peer filtering, allowed-IP policy and HA subnet-router expansion.

use super::TranslateOptions;
use crate::netmap::{NetworkMap, Node, CAP_DATA_PLANE_AUDIT_LOGS, CAP_LOG_EXIT_FLOWS};
use crate::types::{DiscoPublicKey, NodePrivateKey, NodePublicKey, PrivateLogId, StableNodeId};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::{debug, info};

/// Most peer names listed in one skipped-peers log line
const MAX_LOGGED_NAMES: usize = 5;

// ----------------------------------------------------------------------------
// Configuration Types
// ----------------------------------------------------------------------------

/// Data-plane audit logging parameters
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkLogging {
    pub node_id: Option<PrivateLogId>,
    pub domain_id: Option<PrivateLogId>,
    pub log_exit_flows: bool,
}

impl NetworkLogging {
    pub fn is_enabled(&self) -> bool {
        self.node_id.is_some() && self.domain_id.is_some()
    }
}

/// One configured WireGuard peer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PeerConfig {
    pub public_key: NodePublicKey,
    pub disco_key: Option<DiscoPublicKey>,
    pub allowed_ips: Vec<IpNet>,
    /// Source address to masquerade as when sending to this peer
    pub v4_masq_addr: Option<Ipv4Addr>,
    pub v6_masq_addr: Option<Ipv6Addr>,
    pub is_jailed: bool,
}

/// Interface and peer configuration for the WireGuard device
///
/// The default value is the zero configuration pushed while the data plane
/// must carry no traffic.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WireGuardConfig {
    pub name: String,
    pub node_id: Option<StableNodeId>,
    pub private_key: NodePrivateKey,
    pub addresses: Vec<IpNet>,
    pub peers: Vec<PeerConfig>,
    pub network_logging: NetworkLogging,
}

impl WireGuardConfig {
    pub fn peer(&self, key: &NodePublicKey) -> Option<&PeerConfig> {
        self.peers.iter().find(|p| &p.public_key == key)
    }
}

// ----------------------------------------------------------------------------
// Translation
// ----------------------------------------------------------------------------

/// Whether `prefix` advertised by `node` is a subnet route
///
/// A default route is not a subnet. Any multi-address prefix is. A single
/// address is a subnet unless it is one of the node's own addresses.
pub fn cidr_is_subnet(node: &Node, prefix: &IpNet) -> bool {
    if prefix.prefix_len() == 0 {
        return false;
    }
    if prefix.prefix_len() != prefix.max_prefix_len() {
        return true;
    }
    !node.addresses.contains(prefix)
}

fn network_logging(self_node: &Node, nm: &NetworkMap) -> NetworkLogging {
    if !self_node.has_cap(CAP_DATA_PLANE_AUDIT_LOGS)
        || self_node.audit_log_id.is_empty()
        || nm.domain_audit_log_id.is_empty()
    {
        return NetworkLogging::default();
    }
    let node_id = self_node.audit_log_id.parse::<PrivateLogId>();
    let domain_id = nm.domain_audit_log_id.parse::<PrivateLogId>();
    match (node_id, domain_id) {
        (Ok(node_id), Ok(domain_id)) => NetworkLogging {
            node_id: Some(node_id),
            domain_id: Some(domain_id),
            log_exit_flows: self_node.has_cap(CAP_LOG_EXIT_FLOWS),
        },
        (node_id, domain_id) => {
            if let Err(e) = node_id {
                info!("wgcfg: unable to parse node audit log id: {}", e);
            }
            if let Err(e) = domain_id {
                info!("wgcfg: unable to parse domain audit log id: {}", e);
            }
            NetworkLogging::default()
        }
    }
}

/// Primary routes of tag-sharing HA siblings that `peer` does not already allow
fn ha_sibling_routes(nm: &NetworkMap, peer: &Node, allowed: &[IpNet]) -> Vec<IpNet> {
    let mut extra: Vec<IpNet> = Vec::new();
    for other in &nm.peers {
        if other.id == peer.id || other.primary_routes.is_empty() || !other.shares_tag_with(peer) {
            continue;
        }
        for route in &other.primary_routes {
            if !allowed.contains(route) && !extra.contains(route) {
                extra.push(*route);
            }
        }
    }
    extra
}

fn summarize(names: &[String]) -> String {
    let shown: Vec<&str> = names.iter().take(MAX_LOGGED_NAMES).map(String::as_str).collect();
    if names.len() > MAX_LOGGED_NAMES {
        format!("{} (and {} more)", shown.join(", "), names.len() - MAX_LOGGED_NAMES)
    } else {
        shown.join(", ")
    }
}

/// Build the WireGuard configuration for `nm`
///
/// Never fails: unparseable audit log ids only disable network logging, and
/// unusable peers are skipped and logged.
pub fn wireguard_config(
    private_key: &NodePrivateKey,
    nm: &NetworkMap,
    opts: &TranslateOptions,
) -> WireGuardConfig {
    let mut cfg = WireGuardConfig {
        name: opts.tunnel_name.clone(),
        private_key: private_key.clone(),
        addresses: nm.addresses().to_vec(),
        peers: Vec::with_capacity(nm.peers.len()),
        ..Default::default()
    };

    let self_routes_subnet = match &nm.self_node {
        Some(self_node) => {
            cfg.node_id = Some(self_node.stable_id.clone());
            cfg.network_logging = network_logging(self_node, nm);
            self_node.allowed_ips.iter().any(|ip| cidr_is_subnet(self_node, ip))
        }
        None => false,
    };

    let mut skipped_unselected = Vec::new();
    let mut skipped_subnets = Vec::new();
    let mut skipped_expired = Vec::new();

    for peer in &nm.peers {
        if !peer.is_reachable() {
            debug!("wgcfg: skipped peer {}, doesn't offer relay or disco", peer.key.short_string());
            continue;
        }
        if peer.is_expired(opts.now) {
            skipped_expired.push(format!("{}/{}", peer.stable_id, peer.key.short_string()));
            continue;
        }

        let mut cpeer = PeerConfig {
            public_key: peer.key,
            disco_key: peer.disco_key,
            allowed_ips: Vec::with_capacity(peer.allowed_ips.len()),
            v4_masq_addr: peer.self_node_v4_masq_addr,
            v6_masq_addr: peer.self_node_v6_masq_addr,
            is_jailed: peer.is_jailed,
        };

        let selected_exit = opts.exit_node.as_ref() == Some(&peer.stable_id);
        let mut logged_exit = false;
        for allowed in &peer.allowed_ips {
            if allowed.prefix_len() == 0 && !selected_exit {
                if !logged_exit {
                    logged_exit = true;
                    skipped_unselected.push(format!("{:?} ({})", peer.display_name(), peer.key.short_string()));
                }
                continue;
            }
            if cidr_is_subnet(peer, allowed) && !opts.route_all {
                skipped_subnets.push(format!("{} from {:?}", allowed, peer.display_name()));
                continue;
            }
            cpeer.allowed_ips.push(*allowed);
        }

        if opts.route_all && self_routes_subnet && !peer.tags.is_empty() {
            let extra = ha_sibling_routes(nm, peer, &cpeer.allowed_ips);
            if !extra.is_empty() {
                debug!(
                    "wgcfg: expanded {} with {} HA sibling route(s)",
                    peer.display_name(),
                    extra.len()
                );
                cpeer.allowed_ips.extend(extra);
            }
        }

        cfg.peers.push(cpeer);
    }

    if !skipped_unselected.is_empty() {
        debug!("wgcfg: skipped unselected exit nodes: {}", summarize(&skipped_unselected));
    }
    if !skipped_subnets.is_empty() {
        debug!("wgcfg: did not accept subnet routes: {}", summarize(&skipped_subnets));
    }
    if !skipped_expired.is_empty() {
        debug!("wgcfg: skipped expired peers: {}", summarize(&skipped_expired));
    }

    cfg
}

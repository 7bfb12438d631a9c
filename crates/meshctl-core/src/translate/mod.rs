//! Network-map translator
//!
//! Pure transform from (private key, network map, policy flags) to the three
//! configurations the data-plane engine consumes. No shared state; called on
//! every network-map update.

pub mod wgcfg;

pub use wgcfg::{cidr_is_subnet, wireguard_config, NetworkLogging, PeerConfig, WireGuardConfig};

use crate::config::DEFAULT_TUNNEL_NAME;
use crate::netmap::NetworkMap;
use crate::prefs::Prefs;
use crate::types::{NodePrivateKey, StableNodeId, Timestamp};
use ipnet::{IpNet, Ipv4Net};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};

/// Address of the in-tunnel DNS resolver
pub const RESOLVER_IP: Ipv4Addr = Ipv4Addr::new(100, 100, 100, 100);

// ----------------------------------------------------------------------------
// Options
// ----------------------------------------------------------------------------

/// Policy flags steering a translation
#[derive(Debug, Clone, PartialEq)]
pub struct TranslateOptions {
    /// Accept subnet routes advertised by peers
    pub route_all: bool,
    /// Selected exit node, the only peer allowed a default route
    pub exit_node: Option<StableNodeId>,
    pub corp_dns: bool,
    pub snat_subnet_routes: bool,
    pub tunnel_name: String,
    /// Reference time for peer expiry
    pub now: Timestamp,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            route_all: false,
            exit_node: None,
            corp_dns: true,
            snat_subnet_routes: true,
            tunnel_name: DEFAULT_TUNNEL_NAME.to_string(),
            now: Timestamp::default(),
        }
    }
}

impl TranslateOptions {
    /// Options derived from a profile's preferences
    pub fn from_prefs(prefs: &Prefs, tunnel_name: &str, now: Timestamp) -> Self {
        Self {
            route_all: prefs.route_all,
            exit_node: prefs.exit_node_id.clone(),
            corp_dns: prefs.corp_dns,
            snat_subnet_routes: !prefs.no_snat,
            tunnel_name: tunnel_name.to_string(),
            now,
        }
    }
}

// ----------------------------------------------------------------------------
// Router and DNS Configuration
// ----------------------------------------------------------------------------

/// Operating-system routing policy for the tunnel
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    pub local_addrs: Vec<IpNet>,
    pub routes: Vec<IpNet>,
    pub snat_subnet_routes: bool,
}

/// Resolver policy
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Fully qualified name → tailnet addresses
    pub hosts: BTreeMap<String, Vec<IpAddr>>,
    pub search_domains: Vec<String>,
}

/// Everything pushed to the engine in one reconfiguration
///
/// The default value is the zero configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataPlaneConfig {
    pub wireguard: WireGuardConfig,
    pub router: RouterConfig,
    pub dns: DnsConfig,
}

fn router_config(nm: &NetworkMap, wg: &WireGuardConfig, opts: &TranslateOptions) -> RouterConfig {
    let mut routes: Vec<IpNet> = Vec::new();
    for peer in &wg.peers {
        for ip in &peer.allowed_ips {
            if !routes.contains(ip) {
                routes.push(*ip);
            }
        }
    }
    if opts.corp_dns {
        let resolver = IpNet::V4(Ipv4Net::from(RESOLVER_IP));
        if !routes.contains(&resolver) {
            routes.push(resolver);
        }
    }
    routes.sort();
    RouterConfig {
        local_addrs: nm.addresses().to_vec(),
        routes,
        snat_subnet_routes: opts.snat_subnet_routes,
    }
}

fn dns_config(nm: &NetworkMap, opts: &TranslateOptions) -> DnsConfig {
    let mut hosts = BTreeMap::new();
    let nodes = nm.self_node.iter().chain(nm.peers.iter());
    for node in nodes {
        if node.name.is_empty() || node.addresses.is_empty() {
            continue;
        }
        let fqdn = node.name.trim_end_matches('.').to_string();
        hosts.insert(fqdn, node.addresses.iter().map(|a| a.addr()).collect());
    }
    let search_domains = if opts.corp_dns && !nm.domain.is_empty() {
        vec![nm.domain.clone()]
    } else {
        Vec::new()
    };
    DnsConfig { hosts, search_domains }
}

/// Translate a network map into the data-plane configuration
pub fn translate(private_key: &NodePrivateKey, nm: &NetworkMap, opts: &TranslateOptions) -> DataPlaneConfig {
    let wireguard = wireguard_config(private_key, nm, opts);
    let router = router_config(nm, &wireguard, opts);
    let dns = dns_config(nm, opts);
    DataPlaneConfig { wireguard, router, dns }
}

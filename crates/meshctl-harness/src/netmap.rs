//! Network-map builders for tests

use ipnet::{IpNet, Ipv4Net};
use meshctl_core::{
    DiscoPublicKey, NetworkMap, Node, NodeId, NodePublicKey, StableNodeId, Timestamp, UserId, UserProfile,
};
use std::net::Ipv4Addr;

/// Authorized node `n<id>` at 100.64.0.<id>/32 owned by user 1
pub fn test_node(id: u8, name: &str) -> Node {
    let addr = IpNet::V4(Ipv4Net::from(Ipv4Addr::new(100, 64, 0, id)));
    Node {
        id: NodeId(u64::from(id)),
        stable_id: StableNodeId::new(format!("n{}", id)),
        name: format!("{}.example.ts.net.", name),
        user: UserId(1),
        key: NodePublicKey::from_bytes([id; 32]),
        disco_key: Some(DiscoPublicKey::from_bytes([id.wrapping_add(128); 32])),
        home_relay: 1,
        addresses: vec![addr],
        allowed_ips: vec![addr],
        machine_authorized: true,
        ..Default::default()
    }
}

pub fn test_user() -> UserProfile {
    UserProfile {
        id: UserId(1),
        login_name: "user1@example.com".to_string(),
        display_name: "User One".to_string(),
    }
}

/// Authorized self node 1 with one peer, no expiry
pub fn test_netmap() -> NetworkMap {
    let user = test_user();
    NetworkMap {
        self_node: Some(test_node(1, "self")),
        peers: vec![test_node(2, "peer")],
        user_profiles: [(user.id, user)].into_iter().collect(),
        domain: "example.com".to_string(),
        ..Default::default()
    }
}

/// Map whose self node still awaits administrator approval
pub fn unauthorized_netmap() -> NetworkMap {
    let mut nm = test_netmap();
    if let Some(node) = nm.self_node.as_mut() {
        node.machine_authorized = false;
    }
    nm
}

pub fn expiring_netmap(expiry: Timestamp) -> NetworkMap {
    NetworkMap {
        expiry: Some(expiry),
        ..test_netmap()
    }
}

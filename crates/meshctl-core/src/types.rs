//! Core types for the meshctl control-plane client
//!
//! Identifiers, key material newtypes and the injectable clock.

use crate::errors::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(u64);

use core::ops::{Add, Sub};

impl Add<u64> for Timestamp {
    type Output = Timestamp;

    fn add(self, other: u64) -> Timestamp {
        Timestamp(self.0.saturating_add(other))
    }
}

impl Sub for Timestamp {
    type Output = u64;

    fn sub(self, other: Timestamp) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

impl Timestamp {
    /// Create a new timestamp
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Wall clock time
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self(millis)
    }

    /// Get milliseconds since epoch
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Timestamp `millis` before this one, clamped at the epoch
    pub fn saturating_sub_millis(self, millis: u64) -> Self {
        Self(self.0.saturating_sub(millis))
    }
}

// ----------------------------------------------------------------------------
// Time Source
// ----------------------------------------------------------------------------

/// Source of the current time, injected so expiry and URL validity are testable
pub trait TimeSource: Send + Sync {
    /// Get the current timestamp
    fn now(&self) -> Timestamp;
}

/// Standard library implementation of TimeSource
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    pub fn new() -> Self {
        Self
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

// ----------------------------------------------------------------------------
// Identifiers
// ----------------------------------------------------------------------------

/// Numeric node identifier assigned by the coordination service
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Stable, string-form node identifier that survives key rotation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct StableNodeId(pub String);

impl StableNodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StableNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// User identifier within a tailnet
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct UserId(pub u64);

/// Login profile identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProfileId(String);

impl ProfileId {
    /// Generate a fresh random profile id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ----------------------------------------------------------------------------
// Key Material
// ----------------------------------------------------------------------------

fn decode_32(s: &str) -> Result<[u8; 32], ParseError> {
    let bytes = hex::decode(s)?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| ParseError::Length {
        expected: 32,
        actual: len,
    })
}

macro_rules! public_key_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        pub struct $name(#[serde(with = "hex")] [u8; 32]);

        impl $name {
            pub fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; 32]
            }

            /// First eight hex characters, for log lines
            pub fn short_string(&self) -> String {
                hex::encode(&self.0[..4])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.short_string())
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_32(s).map(Self)
            }
        }
    };
}

macro_rules! private_key_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
        pub struct $name(#[serde(with = "hex")] [u8; 32]);

        impl $name {
            /// Generate a new random key
            pub fn generate() -> Self {
                let secret = x25519_dalek::StaticSecret::random_from_rng(rand_core::OsRng);
                Self(secret.to_bytes())
            }

            pub fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; 32]
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_zero() {
                    write!(f, "{}(zero)", stringify!($name))
                } else {
                    write!(f, "{}(redacted)", stringify!($name))
                }
            }
        }
    };
}

public_key_type!(
    /// WireGuard public key of a node
    NodePublicKey
);

public_key_type!(
    /// Discovery (path-finding) public key of a node
    DiscoPublicKey
);

private_key_type!(
    /// WireGuard private key of this node
    NodePrivateKey
);

private_key_type!(
    /// Private key used to sign network-lock updates
    NetworkLockKey
);

impl NodePrivateKey {
    /// Derive the public half
    pub fn public(&self) -> NodePublicKey {
        let secret = x25519_dalek::StaticSecret::from(self.0);
        NodePublicKey(*x25519_dalek::PublicKey::from(&secret).as_bytes())
    }
}

// ----------------------------------------------------------------------------
// Audit Log Identifiers
// ----------------------------------------------------------------------------

/// Private identifier of a data-plane audit log stream
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrivateLogId(#[serde(with = "hex")] [u8; 32]);

impl FromStr for PrivateLogId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_32(s).map(Self)
    }
}

impl fmt::Display for PrivateLogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PrivateLogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateLogId(redacted)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_key_public_derivation_is_stable() {
        let key = NodePrivateKey::generate();
        assert!(!key.is_zero());
        assert_eq!(key.public(), key.public());
        assert!(!key.public().is_zero());
    }

    #[test]
    fn test_private_key_debug_is_redacted() {
        let key = NodePrivateKey::from_bytes([7u8; 32]);
        assert_eq!(format!("{:?}", key), "NodePrivateKey(redacted)");
        assert_eq!(format!("{:?}", NodePrivateKey::default()), "NodePrivateKey(zero)");
    }

    #[test]
    fn test_log_id_rejects_short_input() {
        let err = "abcd".parse::<PrivateLogId>().unwrap_err();
        assert_eq!(err, ParseError::Length { expected: 32, actual: 2 });
        assert!("zz".parse::<PrivateLogId>().is_err());
        assert!(hex::encode([1u8; 32]).parse::<PrivateLogId>().is_ok());
    }

    #[test]
    fn test_timestamp_arithmetic_saturates() {
        let t = Timestamp::new(1_000);
        assert_eq!(t + 500, Timestamp::new(1_500));
        assert_eq!(Timestamp::new(10) - Timestamp::new(20), 0);
        assert_eq!(t.saturating_sub_millis(5_000), Timestamp::new(0));
    }
}

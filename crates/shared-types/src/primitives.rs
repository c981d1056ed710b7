//! # Primitives
//!
//! Base types used throughout the node. Heights are 1-based; height 0
//! means "nothing committed yet". Timestamps are nanoseconds since the
//! Unix epoch, matching the resolution of block headers on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// 1-based index of a committed block. 0 = empty chain.
pub type BlockHeight = u64;

/// Nanoseconds since the Unix epoch.
pub type TimestampNano = u64;

/// 32-byte SHA-256 digest.
pub type Hash = [u8; 32];

/// Identifier of a virtual chain within one node.
pub type VirtualChainId = u32;

/// Protocol version carried by every block and transaction.
pub type ProtocolVersion = u32;

/// Size of a node address in bytes.
pub const NODE_ADDRESS_SIZE: usize = 20;

/// A validator identity: the last 20 bytes of Keccak-256 of the node's
/// uncompressed secp256k1 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddress([u8; NODE_ADDRESS_SIZE]);

impl NodeAddress {
    /// Wrap raw address bytes.
    pub fn from_bytes(bytes: [u8; NODE_ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse an address from a slice; fails unless exactly 20 bytes.
    pub fn try_from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; NODE_ADDRESS_SIZE] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Parse an address from a hex string.
    pub fn try_from_hex(s: &str) -> Option<Self> {
        Self::try_from_slice(&hex::decode(s.trim()).ok()?)
    }

    /// Raw address bytes.
    pub fn as_bytes(&self) -> &[u8; NODE_ADDRESS_SIZE] {
        &self.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable.
        write!(f, "{}..", hex::encode(&self.0[..4]))
    }
}

/// Current wall-clock time in nanoseconds since the Unix epoch.
pub fn now_nano() -> TimestampNano {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as TimestampNano)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_address_roundtrip() {
        let addr = NodeAddress::from_bytes([0xAB; 20]);
        let parsed = NodeAddress::try_from_hex(&addr.to_string()).unwrap();
        assert_eq!(addr, parsed);
    }

    #[test]
    fn test_node_address_rejects_wrong_length() {
        assert!(NodeAddress::try_from_slice(&[1, 2, 3]).is_none());
        assert!(NodeAddress::try_from_hex("abcd").is_none());
    }

    #[test]
    fn test_now_nano_monotone_enough() {
        let a = now_nano();
        let b = now_nano();
        assert!(b >= a);
    }
}

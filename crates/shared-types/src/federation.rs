//! # Federation
//!
//! The fixed set of validator nodes known to all participants at
//! genesis. Elections may later replace the active set, but the genesis
//! federation is the fallback whenever elections are not active.

use crate::primitives::NodeAddress;
use serde::{Deserialize, Serialize};

/// One validator node in the federation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationNode {
    pub address: NodeAddress,
    pub gossip_endpoint: String,
    pub gossip_port: u16,
}

impl FederationNode {
    /// `host:port` string for the TCP transport.
    pub fn gossip_socket_addr(&self) -> String {
        format!("{}:{}", self.gossip_endpoint, self.gossip_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gossip_socket_addr() {
        let node = FederationNode {
            address: NodeAddress::from_bytes([1; 20]),
            gossip_endpoint: "10.0.0.7".into(),
            gossip_port: 4400,
        };
        assert_eq!(node.gossip_socket_addr(), "10.0.0.7:4400");
    }
}

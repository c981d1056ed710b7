//! # Transport Seam
//!
//! The narrow interface every concrete transport implements. Payloads
//! are opaque byte chunks; per-peer delivery order is FIFO; nothing is
//! guaranteed across peers.

use async_trait::async_trait;
use shared_types::NodeAddress;
use thiserror::Error;

/// Addressing mode of one send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecipientMode {
    /// Every known peer.
    Broadcast,
    /// Exactly the listed addresses.
    List,
    /// Every known peer except the listed addresses.
    AllButList,
}

/// One outgoing message.
#[derive(Clone, Debug)]
pub struct TransportData {
    pub sender_node_address: NodeAddress,
    pub recipient_mode: RecipientMode,
    pub recipient_node_addresses: Vec<NodeAddress>,
    pub payloads: Vec<Vec<u8>>,
}

impl TransportData {
    pub fn broadcast(sender: NodeAddress, payloads: Vec<Vec<u8>>) -> Self {
        Self {
            sender_node_address: sender,
            recipient_mode: RecipientMode::Broadcast,
            recipient_node_addresses: vec![],
            payloads,
        }
    }

    pub fn to_list(
        sender: NodeAddress,
        recipients: Vec<NodeAddress>,
        payloads: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            sender_node_address: sender,
            recipient_mode: RecipientMode::List,
            recipient_node_addresses: recipients,
            payloads,
        }
    }

    pub fn all_but(
        sender: NodeAddress,
        excluded: Vec<NodeAddress>,
        payloads: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            sender_node_address: sender,
            recipient_mode: RecipientMode::AllButList,
            recipient_node_addresses: excluded,
            payloads,
        }
    }
}

/// Transport failure taxonomy.
#[derive(Debug, Error)]
pub enum GossipError {
    #[error("unknown recipient {0}")]
    UnknownRecipient(NodeAddress),

    #[error("transport send failed: {0}")]
    SendFailed(String),

    #[error("gossip message decode failed: {0}")]
    Decode(String),

    /// Injected by the tampering testkit.
    #[error("message failed by tampering transport")]
    Tampered,
}

/// Receives every message addressed to this node.
#[async_trait]
pub trait TransportListener: Send + Sync {
    async fn on_transport_message_received(&self, payloads: Vec<Vec<u8>>);
}

/// A concrete transport adapter.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, data: TransportData) -> Result<(), GossipError>;

    fn register_listener(&self, listener: std::sync::Arc<dyn TransportListener>);
}

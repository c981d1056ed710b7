//! # Gossip Messages
//!
//! The application-level codec: every topic the node gossips about is a
//! variant of one serde enum, bincode-encoded as a single transport
//! payload. The variant encoding is part of the wire contract; add new
//! variants at the end only.

use crate::transport::GossipError;
use serde::{Deserialize, Serialize};
use shared_types::{BlockHeight, BlockPair, BlockType, NodeAddress, SignedTransaction};

/// A signed range of block heights exchanged during sync.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSyncRange {
    pub block_type: BlockType,
    pub first_block_height: BlockHeight,
    pub last_block_height: BlockHeight,
    pub last_committed_block_height: BlockHeight,
}

/// Every message the node gossips.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GossipMessage {
    /// Transaction relay: admitted transactions forwarded to peers.
    ForwardedTransactions {
        sender: NodeAddress,
        transactions: Vec<SignedTransaction>,
    },

    /// Block sync: petitioner asks who has blocks beyond its height.
    BlockAvailabilityRequest {
        sender: NodeAddress,
        range: BlockSyncRange,
    },

    /// Block sync: a source answers with the range it can serve.
    BlockAvailabilityResponse {
        sender: NodeAddress,
        range: BlockSyncRange,
    },

    /// Block sync: petitioner requests a chunk from its chosen source.
    BlockSyncRequest {
        sender: NodeAddress,
        range: BlockSyncRange,
    },

    /// Block sync: the source ships a chunk of blocks.
    BlockSyncResponse {
        sender: NodeAddress,
        range: BlockSyncRange,
        blocks: Vec<BlockPair>,
    },

    /// Consensus: a freshly committed block, leader to federation.
    BlockCommitted {
        sender: NodeAddress,
        block: Box<BlockPair>,
    },
}

impl GossipMessage {
    /// Encode into one transport payload.
    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).unwrap_or_else(|_| unreachable!("gossip encoding cannot fail"))
    }

    /// Decode from one transport payload.
    pub fn decode(payload: &[u8]) -> Result<Self, GossipError> {
        bincode::deserialize(payload).map_err(|e| GossipError::Decode(e.to_string()))
    }
}

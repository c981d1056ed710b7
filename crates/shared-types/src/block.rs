//! # Blocks
//!
//! A committed block is a pair: the transactions block (what was agreed
//! on) and the results block (what executing it did). Both halves carry
//! their own header and consensus proof. Blocks are immutable once
//! written to persistence.

use crate::primitives::{
    BlockHeight, Hash, NodeAddress, ProtocolVersion, TimestampNano, VirtualChainId,
};
use crate::state::ContractStateDiff;
use crate::transaction::{SignedTransaction, TransactionReceipt};
use serde::{Deserialize, Serialize};

/// Which half of a block pair a sync exchange refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockType {
    BlockPair,
    TransactionsOnly,
    ResultsOnly,
}

/// Header of the transactions half.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionsBlockHeader {
    pub protocol_version: ProtocolVersion,
    pub virtual_chain_id: VirtualChainId,
    pub block_height: BlockHeight,
    /// Hash of the previous transactions block; zero for height 1.
    pub prev_block_hash: Hash,
    pub timestamp: TimestampNano,
    pub num_signed_transactions: u32,
}

/// Header of the results half. The two state roots pin the execution of
/// this block into the Merkle forest: `pre_execution_state_root` is the
/// root at height H-1 and `post_execution_state_root` the root at H.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultsBlockHeader {
    pub protocol_version: ProtocolVersion,
    pub virtual_chain_id: VirtualChainId,
    pub block_height: BlockHeight,
    /// Hash of the previous results block; zero for height 1.
    pub prev_block_hash: Hash,
    pub timestamp: TimestampNano,
    pub pre_execution_state_root: Hash,
    pub post_execution_state_root: Hash,
    pub num_transaction_receipts: u32,
}

/// One consensus signature: the signer's address and a recoverable ECDSA
/// signature over the block-pair hash. The address must be recoverable
/// from the signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofSigner {
    pub node_address: NodeAddress,
    /// 65-byte recoverable signature (r ‖ s ‖ v).
    pub signature: Vec<u8>,
}

/// Consensus proof attached to each block half.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockProof {
    pub signers: Vec<ProofSigner>,
}

/// The ordered, signed transactions agreed on for one height.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionsBlock {
    pub header: TransactionsBlockHeader,
    pub metadata: Vec<u8>,
    pub signed_transactions: Vec<SignedTransaction>,
    pub proof: BlockProof,
}

/// The receipts and state writes produced by executing one height.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultsBlock {
    pub header: ResultsBlockHeader,
    pub transaction_receipts: Vec<TransactionReceipt>,
    pub contract_state_diffs: Vec<ContractStateDiff>,
    pub proof: BlockProof,
}

/// A committed block: both halves at the same height.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPair {
    pub transactions_block: TransactionsBlock,
    pub results_block: ResultsBlock,
}

impl BlockPair {
    /// Height of this block. Both halves always agree.
    pub fn height(&self) -> BlockHeight {
        self.transactions_block.header.block_height
    }

    /// Timestamp from the transactions half.
    pub fn timestamp(&self) -> TimestampNano {
        self.transactions_block.header.timestamp
    }
}

//! # Shared Types
//!
//! Primitives and the on-chain data model shared by every Fedledger
//! subsystem: heights, hashes, node addresses, blocks, transactions,
//! state diffs, the federation description, node configuration, and the
//! block-height tracker used by storage services.
//!
//! This crate is pure data plus one synchronization primitive; all
//! hashing and signing lives in `shared-crypto`.

pub mod block;
pub mod config;
pub mod federation;
pub mod primitives;
pub mod state;
pub mod tracker;
pub mod transaction;

pub use block::{
    BlockPair, BlockProof, BlockType, ProofSigner, ResultsBlock, ResultsBlockHeader,
    TransactionsBlock, TransactionsBlockHeader,
};
pub use config::NodeConfig;
pub use federation::FederationNode;
pub use primitives::{
    BlockHeight, Hash, NodeAddress, ProtocolVersion, TimestampNano, VirtualChainId,
    NODE_ADDRESS_SIZE,
};
pub use state::{inflate_chain_state, merge_chain_state, ChainState, ContractStateDiff, StateRecord};
pub use tracker::{BlockTracker, TrackerError};
pub use transaction::{
    Argument, ExecutionResult, SignedTransaction, Transaction, TransactionReceipt,
    TransactionStatus,
};

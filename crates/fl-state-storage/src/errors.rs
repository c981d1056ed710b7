//! State storage error taxonomy.

use shared_types::BlockHeight;
use thiserror::Error;

/// Errors from Merkle proof extraction and verification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MerkleError {
    /// The proof ended before a conclusion could be reached.
    #[error("proof incomplete")]
    ProofIncomplete,

    /// A proof node's hash does not match the expected link; the proof
    /// is inconsistent with the root or was tampered with.
    #[error("proof node hash mismatch")]
    ProofHashMismatch,

    /// The requested trie id is not retained in the forest.
    #[error("unknown trie id {0}")]
    UnknownTrie(u64),
}

/// Errors surfaced by the state storage service.
#[derive(Debug, Error)]
pub enum StateStorageError {
    /// The requested snapshot has been evicted from the ring.
    #[error("height {height} too old: current {current}, keeping {history} back")]
    TooOld {
        height: BlockHeight,
        current: BlockHeight,
        history: u32,
    },

    /// The requested height was not committed within the grace timeout.
    #[error("height {0} not committed within grace timeout")]
    Timeout(BlockHeight),

    /// The requested height is too far past the chain head to wait for.
    #[error("height {requested} out of grace range at {current}")]
    OutOfGraceRange {
        requested: BlockHeight,
        current: BlockHeight,
    },

    /// Proposals must project on top of the current committed height.
    #[error("projection base {base} does not match current height {current}")]
    StaleProjectionBase {
        base: BlockHeight,
        current: BlockHeight,
    },

    #[error("no state root recorded for height {0}")]
    UnknownRoot(BlockHeight),

    #[error(transparent)]
    Merkle(#[from] MerkleError),

    #[error("state persistence error: {0}")]
    Persistence(String),
}

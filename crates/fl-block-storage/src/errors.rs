//! Block storage error taxonomy.
//!
//! `Corrupt` and `FormatMismatch` are fatal when they surface after
//! startup; a bad frame found while scanning at open time is recovered
//! by truncation instead and never becomes an error.

use shared_types::BlockHeight;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlockStorageError {
    /// Write skipped ahead; the caller should retry from `next_desired`.
    #[error("out of order write: received height {received}, next desired {next_desired}")]
    OutOfOrder {
        received: BlockHeight,
        next_desired: BlockHeight,
    },

    #[error("block at height {0} not found")]
    NotFound(BlockHeight),

    #[error("block persistence I/O error: {0}")]
    Io(String),

    /// Block file header disagrees with this node's identity.
    #[error("block file {field} mismatch: expected {expected}, found {actual}")]
    FormatMismatch {
        field: &'static str,
        expected: u32,
        actual: u32,
    },

    /// CRC or framing failure during a post-open read.
    #[error("block file corrupt at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    /// Another process holds the block file.
    #[error("block file locked: {0}")]
    Locked(String),

    #[error("block failed validation: {0}")]
    ValidationFailed(String),

    /// A downstream commit (state storage, transaction pool) failed.
    #[error("dependent commit failed: {0}")]
    Dependency(String),
}

impl From<std::io::Error> for BlockStorageError {
    fn from(e: std::io::Error) -> Self {
        BlockStorageError::Io(e.to_string())
    }
}

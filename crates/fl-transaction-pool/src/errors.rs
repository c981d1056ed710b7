//! Pool error taxonomy. A rejection is not a bare error code: clients
//! get a receipt-shaped reply stating the status and the chain position
//! it was decided at.

use shared_types::{BlockHeight, Hash, TimestampNano, TransactionStatus};
use thiserror::Error;

/// Receipt-shaped reply for both admissions and rejections.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionStatusReply {
    pub txhash: Hash,
    pub status: TransactionStatus,
    /// Chain position as of the decision.
    pub block_height: BlockHeight,
    pub block_timestamp: TimestampNano,
}

#[derive(Debug, Error)]
pub enum TransactionPoolError {
    /// Admission denied; the reply carries the specific status.
    #[error("transaction rejected: {:?}", .0.status)]
    Rejected(TransactionStatusReply),

    /// A forwarding or virtual-machine dependency failed.
    #[error("pool dependency failed: {0}")]
    Dependency(String),
}

impl TransactionPoolError {
    /// The status carried by a rejection.
    pub fn status(&self) -> Option<TransactionStatus> {
        match self {
            TransactionPoolError::Rejected(reply) => Some(reply.status),
            TransactionPoolError::Dependency(_) => None,
        }
    }
}

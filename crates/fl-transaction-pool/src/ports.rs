//! Capability interfaces the pool consumes: the virtual machine's
//! pre-order check and the gossip forwarding edge. Passed in at
//! construction.

use async_trait::async_trait;
use shared_types::SignedTransaction;
use thiserror::Error;

/// Error from a cross-service port call.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PortError(pub String);

/// Pool → virtual machine edge: contract-level admission check.
#[async_trait]
pub trait PreOrderChecker: Send + Sync {
    /// `Err` means the contract rejected the transaction pre-order.
    async fn check_transaction(&self, transaction: &SignedTransaction) -> Result<(), PortError>;
}

/// Pool → gossip edge: relay admitted transactions to peers.
#[async_trait]
pub trait TransactionForwarder: Send + Sync {
    async fn forward_transactions(
        &self,
        transactions: Vec<SignedTransaction>,
    ) -> Result<(), PortError>;
}

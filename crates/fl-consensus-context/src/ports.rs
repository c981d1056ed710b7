//! Capability interfaces the consensus context consumes, one per
//! caller→callee edge, passed in at construction.

use async_trait::async_trait;
use shared_types::{
    Argument, BlockHeight, ContractStateDiff, Hash, SignedTransaction, TransactionReceipt,
};
use thiserror::Error;

/// Error from a cross-service port call.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PortError(pub String);

/// Consensus context → transaction pool edge.
#[async_trait]
pub trait TransactionBatchSource: Send + Sync {
    async fn get_transactions_for_ordering(&self, max_count: u32) -> Vec<SignedTransaction>;
}

/// What executing an ordered transaction set produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessedTransactionSet {
    pub transaction_receipts: Vec<TransactionReceipt>,
    pub contract_state_diffs: Vec<ContractStateDiff>,
}

/// Consensus context → virtual machine edge.
#[async_trait]
pub trait VmExecutor: Send + Sync {
    /// Execute `transactions` as the body of block `block_height`,
    /// reading state as of `block_height - 1`.
    async fn process_transaction_set(
        &self,
        block_height: BlockHeight,
        transactions: &[SignedTransaction],
    ) -> Result<ProcessedTransactionSet, PortError>;

    /// Read-only call into a system contract at `block_height`.
    async fn call_system_contract(
        &self,
        block_height: BlockHeight,
        contract_name: &str,
        method_name: &str,
    ) -> Result<Vec<Argument>, PortError>;
}

/// Consensus context → state storage edge.
#[async_trait]
pub trait StateRootReader: Send + Sync {
    async fn get_state_hash(&self, height: BlockHeight) -> Result<Hash, PortError>;

    /// Root that `diffs` would produce on top of committed `base_height`
    /// without committing them.
    async fn project_root(
        &self,
        base_height: BlockHeight,
        diffs: &[ContractStateDiff],
    ) -> Result<Hash, PortError>;
}

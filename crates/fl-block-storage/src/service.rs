//! # Block Storage Service
//!
//! The commit path of the node. `commit_block` appends a block to
//! persistence and then fans its results out: the state diff goes to
//! state storage, the receipts go to the transaction pool. Stale blocks
//! are ignored end to end, so replaying a chunk of already-committed
//! blocks is harmless.

use crate::errors::BlockStorageError;
use crate::ports::{BlockPersistence, PortError, ReceiptCommitter, StateCommitter, WriteStatus};
use shared_types::{
    BlockHeight, BlockPair, BlockTracker, Hash, TimestampNano, VirtualChainId,
};
use std::sync::Arc;
use tracing::info;

pub struct BlockStorageService {
    virtual_chain_id: VirtualChainId,
    persistence: Arc<dyn BlockPersistence>,
    state: Arc<dyn StateCommitter>,
    receipts: Arc<dyn ReceiptCommitter>,
}

impl BlockStorageService {
    pub fn new(
        virtual_chain_id: VirtualChainId,
        persistence: Arc<dyn BlockPersistence>,
        state: Arc<dyn StateCommitter>,
        receipts: Arc<dyn ReceiptCommitter>,
    ) -> Self {
        Self { virtual_chain_id, persistence, state, receipts }
    }

    /// Append `block` and commit its results downstream.
    ///
    /// Heights at or below the current head are ignored without side
    /// effects; a height beyond `last + 1` is `OutOfOrder`.
    pub async fn commit_block(&self, block: &BlockPair) -> Result<WriteStatus, BlockStorageError> {
        self.validate_block(block)?;

        if self.persistence.write_next_block(block)? == WriteStatus::Ignored {
            return Ok(WriteStatus::Ignored);
        }

        let header = &block.results_block.header;
        self.state
            .commit_state_diff(
                header.block_height,
                header.timestamp,
                &block.results_block.contract_state_diffs,
            )
            .await
            .map_err(|PortError(e)| BlockStorageError::Dependency(e))?;
        self.receipts
            .commit_transaction_receipts(
                header.block_height,
                header.timestamp,
                &block.results_block.transaction_receipts,
            )
            .await
            .map_err(|PortError(e)| BlockStorageError::Dependency(e))?;

        info!(
            height = header.block_height,
            transactions = block.transactions_block.signed_transactions.len(),
            "block committed"
        );
        Ok(WriteStatus::Written)
    }

    fn validate_block(&self, block: &BlockPair) -> Result<(), BlockStorageError> {
        let tx_header = &block.transactions_block.header;
        let rx_header = &block.results_block.header;
        if tx_header.virtual_chain_id != self.virtual_chain_id {
            return Err(BlockStorageError::ValidationFailed(format!(
                "virtual chain id {} does not match node chain {}",
                tx_header.virtual_chain_id, self.virtual_chain_id
            )));
        }
        if tx_header.block_height != rx_header.block_height {
            return Err(BlockStorageError::ValidationFailed(format!(
                "half heights disagree: transactions {}, results {}",
                tx_header.block_height, rx_header.block_height
            )));
        }
        Ok(())
    }

    pub fn get_last_block_height(&self) -> Result<BlockHeight, BlockStorageError> {
        self.persistence.get_last_block_height()
    }

    pub fn get_last_block(&self) -> Result<Option<BlockPair>, BlockStorageError> {
        self.persistence.get_last_block()
    }

    pub fn get_block_pair(&self, height: BlockHeight) -> Result<BlockPair, BlockStorageError> {
        self.persistence.get_block_pair(height)
    }

    pub fn get_transactions_block(
        &self,
        height: BlockHeight,
    ) -> Result<shared_types::TransactionsBlock, BlockStorageError> {
        self.persistence.get_transactions_block(height)
    }

    pub fn get_results_block(
        &self,
        height: BlockHeight,
    ) -> Result<shared_types::ResultsBlock, BlockStorageError> {
        self.persistence.get_results_block(height)
    }

    pub fn get_blocks(
        &self,
        first: BlockHeight,
        last: BlockHeight,
    ) -> Result<Vec<BlockPair>, BlockStorageError> {
        self.persistence.get_blocks(first, last)
    }

    pub fn get_block_by_tx(
        &self,
        txhash: Hash,
        min_ts: TimestampNano,
        max_ts: TimestampNano,
    ) -> Result<Option<(BlockPair, usize)>, BlockStorageError> {
        self.persistence.get_block_by_tx(txhash, min_ts, max_ts)
    }

    pub fn block_tracker(&self) -> &BlockTracker {
        self.persistence.block_tracker()
    }

    pub fn persistence(&self) -> &Arc<dyn BlockPersistence> {
        &self.persistence
    }
}

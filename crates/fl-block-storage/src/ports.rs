//! # Ports
//!
//! The persistence seam under the block service, and the capability
//! interfaces block storage and sync consume from their collaborators.
//! Each trait covers exactly one caller→callee edge and is passed in at
//! construction; nothing reaches back through a global registry.

use crate::errors::BlockStorageError;
use async_trait::async_trait;
use fl_gossip::BlockSyncRange;
use shared_types::{
    BlockHeight, BlockPair, BlockTracker, ContractStateDiff, Hash, NodeAddress, TimestampNano,
    TransactionReceipt, TransactionsBlock, ResultsBlock,
};
use thiserror::Error;

/// Outcome of a `write_next_block`: stale writes are ignored, not
/// errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteStatus {
    Written,
    Ignored,
}

/// Paging callback for `scan_blocks`; return `false` to stop.
pub type ScanCursor<'a> = dyn FnMut(BlockHeight, &[BlockPair]) -> bool + Send + 'a;

/// Ordered block log backend.
pub trait BlockPersistence: Send + Sync {
    /// Append the next block. Idempotent for `height ≤ last`; fails
    /// with `OutOfOrder` beyond `last + 1`.
    fn write_next_block(&self, block: &BlockPair) -> Result<WriteStatus, BlockStorageError>;

    fn get_last_block(&self) -> Result<Option<BlockPair>, BlockStorageError>;

    fn get_last_block_height(&self) -> Result<BlockHeight, BlockStorageError>;

    fn get_block_pair(&self, height: BlockHeight) -> Result<BlockPair, BlockStorageError>;

    /// Inclusive range read; the caller clamps to available heights.
    fn get_blocks(
        &self,
        first: BlockHeight,
        last: BlockHeight,
    ) -> Result<Vec<BlockPair>, BlockStorageError>;

    /// Page through blocks from `from`. Readers see a prefix snapshot
    /// even under concurrent writers.
    fn scan_blocks(
        &self,
        from: BlockHeight,
        page_size: u8,
        cursor: &mut ScanCursor<'_>,
    ) -> Result<(), BlockStorageError>;

    /// Locate a transaction by hash, narrowing candidates to blocks
    /// whose timestamp lies strictly inside `(min_ts, max_ts)`.
    fn get_block_by_tx(
        &self,
        txhash: Hash,
        min_ts: TimestampNano,
        max_ts: TimestampNano,
    ) -> Result<Option<(BlockPair, usize)>, BlockStorageError>;

    /// Tracker that callers await committed heights on.
    fn block_tracker(&self) -> &BlockTracker;

    fn get_transactions_block(
        &self,
        height: BlockHeight,
    ) -> Result<TransactionsBlock, BlockStorageError> {
        Ok(self.get_block_pair(height)?.transactions_block)
    }

    fn get_results_block(&self, height: BlockHeight) -> Result<ResultsBlock, BlockStorageError> {
        Ok(self.get_block_pair(height)?.results_block)
    }
}

/// Error from a cross-service port call.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PortError(pub String);

/// Block storage → state storage edge.
#[async_trait]
pub trait StateCommitter: Send + Sync {
    async fn commit_state_diff(
        &self,
        height: BlockHeight,
        timestamp: TimestampNano,
        diffs: &[ContractStateDiff],
    ) -> Result<(), PortError>;
}

/// Block storage → transaction pool edge.
#[async_trait]
pub trait ReceiptCommitter: Send + Sync {
    async fn commit_transaction_receipts(
        &self,
        height: BlockHeight,
        timestamp: TimestampNano,
        receipts: &[TransactionReceipt],
    ) -> Result<(), PortError>;
}

/// How sync hands a block to the consensus engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleBlockConsensusMode {
    /// Validate the block against its predecessor, then track it.
    VerifyAndUpdate,
    /// Only inform consensus of the node's current position.
    UpdateOnly,
}

/// Block sync → consensus engine edge.
#[async_trait]
pub trait BlockConsensusHandler: Send + Sync {
    async fn handle_block_consensus(
        &self,
        mode: HandleBlockConsensusMode,
        block: Option<&BlockPair>,
        prev_block: Option<&BlockPair>,
    ) -> Result<(), PortError>;
}

/// Block sync → gossip edge.
#[async_trait]
pub trait BlockSyncGossip: Send + Sync {
    async fn broadcast_block_availability_request(
        &self,
        range: BlockSyncRange,
    ) -> Result<(), PortError>;

    async fn send_block_availability_response(
        &self,
        recipient: NodeAddress,
        range: BlockSyncRange,
    ) -> Result<(), PortError>;

    async fn send_block_sync_request(
        &self,
        recipient: NodeAddress,
        range: BlockSyncRange,
    ) -> Result<(), PortError>;

    async fn send_block_sync_response(
        &self,
        recipient: NodeAddress,
        range: BlockSyncRange,
        blocks: Vec<BlockPair>,
    ) -> Result<(), PortError>;
}

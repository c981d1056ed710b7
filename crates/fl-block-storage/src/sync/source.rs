//! # Block Sync Source
//!
//! The serving side of block sync. A node answers availability
//! requests only when it actually has blocks past the petitioner's
//! head, and clamps every chunk request to its batch size and to the
//! heights it holds.

use crate::ports::{BlockSyncGossip, PortError};
use crate::service::BlockStorageService;
use fl_gossip::BlockSyncRange;
use shared_types::NodeAddress;
use std::sync::Arc;
use tracing::{debug, info};

pub struct BlockSyncSource {
    batch_size: u32,
    storage: Arc<BlockStorageService>,
    gossip: Arc<dyn BlockSyncGossip>,
}

impl BlockSyncSource {
    pub fn new(
        batch_size: u32,
        storage: Arc<BlockStorageService>,
        gossip: Arc<dyn BlockSyncGossip>,
    ) -> Self {
        Self { batch_size, storage, gossip }
    }

    /// Answer an availability request — but only when we are ahead of
    /// the petitioner.
    pub async fn handle_block_availability_request(
        &self,
        petitioner: NodeAddress,
        range: BlockSyncRange,
    ) -> Result<(), PortError> {
        let last_committed = self
            .storage
            .get_last_block_height()
            .map_err(|e| PortError(e.to_string()))?;
        if last_committed <= range.last_committed_block_height {
            debug!(
                %petitioner,
                ours = last_committed,
                theirs = range.last_committed_block_height,
                "nothing to offer petitioner"
            );
            return Ok(());
        }

        let response = BlockSyncRange {
            block_type: range.block_type,
            first_block_height: 1,
            last_block_height: last_committed,
            last_committed_block_height: last_committed,
        };
        info!(%petitioner, available = last_committed, "answering availability request");
        self.gossip.send_block_availability_response(petitioner, response).await
    }

    /// Serve a chunk request, clamped to `batch_size` and to the blocks
    /// we hold.
    pub async fn handle_block_sync_request(
        &self,
        petitioner: NodeAddress,
        range: BlockSyncRange,
    ) -> Result<(), PortError> {
        let last_committed = self
            .storage
            .get_last_block_height()
            .map_err(|e| PortError(e.to_string()))?;
        let first = range.first_block_height;
        if first == 0 || last_committed < first {
            debug!(%petitioner, first, ours = last_committed, "cannot serve requested range");
            return Ok(());
        }

        // Clamp to the batch size first, then to what exists.
        let mut last = range.last_block_height;
        if last.saturating_sub(first) > self.batch_size as u64 - 1 {
            last = first + self.batch_size as u64 - 1;
        }
        last = std::cmp::min(last, last_committed);

        let blocks = self
            .storage
            .get_blocks(first, last)
            .map_err(|e| PortError(e.to_string()))?;
        info!(%petitioner, first, last, "serving block sync chunk");

        let response = BlockSyncRange {
            block_type: range.block_type,
            first_block_height: first,
            last_block_height: last,
            last_committed_block_height: last_committed,
        };
        self.gossip.send_block_sync_response(petitioner, response, blocks).await
    }
}

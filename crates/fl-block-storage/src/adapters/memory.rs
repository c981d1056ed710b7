//! # In-Memory Block Persistence
//!
//! An ordered slice of block pairs behind a read/write lock. The
//! development network and most tests run on this backend.

use crate::errors::BlockStorageError;
use crate::ports::{BlockPersistence, ScanCursor, WriteStatus};
use shared_types::{BlockHeight, BlockPair, BlockTracker, Hash, TimestampNano};
use std::sync::RwLock;
use tracing::info;

pub struct InMemoryBlockPersistence {
    chain: RwLock<Vec<BlockPair>>,
    tracker: BlockTracker,
}

impl InMemoryBlockPersistence {
    pub fn new(tracker_grace_distance: u64, preloaded: Vec<BlockPair>) -> Self {
        let tracker = BlockTracker::new(preloaded.len() as BlockHeight, tracker_grace_distance);
        Self { chain: RwLock::new(preloaded), tracker }
    }

    fn read_chain(&self) -> std::sync::RwLockReadGuard<'_, Vec<BlockPair>> {
        self.chain.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl BlockPersistence for InMemoryBlockPersistence {
    fn write_next_block(&self, block: &BlockPair) -> Result<WriteStatus, BlockStorageError> {
        let height = block.height();
        let mut chain = self.chain.write().unwrap_or_else(|e| e.into_inner());
        let next_desired = chain.len() as BlockHeight + 1;
        if height > next_desired {
            return Err(BlockStorageError::OutOfOrder { received: height, next_desired });
        }
        if height < next_desired {
            info!(height, next_desired, "ignoring write of stale block");
            return Ok(WriteStatus::Ignored);
        }
        chain.push(block.clone());
        // Advance under the lock so concurrent writers cannot reorder
        // the tracker.
        self.tracker.increment_to(height);
        Ok(WriteStatus::Written)
    }

    fn get_last_block(&self) -> Result<Option<BlockPair>, BlockStorageError> {
        Ok(self.read_chain().last().cloned())
    }

    fn get_last_block_height(&self) -> Result<BlockHeight, BlockStorageError> {
        Ok(self.read_chain().len() as BlockHeight)
    }

    fn get_block_pair(&self, height: BlockHeight) -> Result<BlockPair, BlockStorageError> {
        let chain = self.read_chain();
        if height == 0 || height > chain.len() as BlockHeight {
            return Err(BlockStorageError::NotFound(height));
        }
        Ok(chain[(height - 1) as usize].clone())
    }

    fn get_blocks(
        &self,
        first: BlockHeight,
        last: BlockHeight,
    ) -> Result<Vec<BlockPair>, BlockStorageError> {
        let chain = self.read_chain();
        if first == 0 || first > last || last > chain.len() as BlockHeight {
            return Err(BlockStorageError::NotFound(last));
        }
        Ok(chain[(first - 1) as usize..last as usize].to_vec())
    }

    fn scan_blocks(
        &self,
        mut from: BlockHeight,
        page_size: u8,
        cursor: &mut ScanCursor<'_>,
    ) -> Result<(), BlockStorageError> {
        // Holding the read lock for the whole scan gives the cursor a
        // consistent prefix snapshot under concurrent writers.
        let chain = self.read_chain();
        let total = chain.len() as BlockHeight;
        let page = page_size.max(1) as BlockHeight;

        let mut wants_more = true;
        while from <= total && wants_more {
            let from_index = (from - 1) as usize;
            let to_index = std::cmp::min(from_index + page as usize, total as usize);
            wants_more = cursor(from, &chain[from_index..to_index]);
            from = to_index as BlockHeight + 1;
        }
        Ok(())
    }

    fn get_block_by_tx(
        &self,
        txhash: Hash,
        min_ts: TimestampNano,
        max_ts: TimestampNano,
    ) -> Result<Option<(BlockPair, usize)>, BlockStorageError> {
        let chain = self.read_chain();
        for block in chain.iter() {
            let block_ts = block.transactions_block.header.timestamp;
            if block_ts <= min_ts || block_ts >= max_ts {
                continue;
            }
            for (index, receipt) in block.results_block.transaction_receipts.iter().enumerate() {
                if receipt.txhash == txhash {
                    return Ok(Some((block.clone(), index)));
                }
            }
        }
        Ok(None)
    }

    fn block_tracker(&self) -> &BlockTracker {
        &self.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_util::block_pair_at;

    fn new_persistence() -> InMemoryBlockPersistence {
        InMemoryBlockPersistence::new(5, vec![])
    }

    #[test]
    fn test_contiguous_writes_advance_height() {
        let persistence = new_persistence();
        for h in 1..=4 {
            let status = persistence.write_next_block(&block_pair_at(h, 1_000 * h)).unwrap();
            assert_eq!(status, WriteStatus::Written);
            assert_eq!(persistence.get_last_block_height().unwrap(), h);
        }
        assert_eq!(persistence.get_last_block().unwrap().unwrap().height(), 4);
        assert_eq!(persistence.get_block_pair(2).unwrap().height(), 2);
    }

    #[test]
    fn test_stale_write_is_ignored_not_error() {
        let persistence = new_persistence();
        persistence.write_next_block(&block_pair_at(1, 10)).unwrap();
        persistence.write_next_block(&block_pair_at(2, 20)).unwrap();

        let status = persistence.write_next_block(&block_pair_at(1, 99)).unwrap();
        assert_eq!(status, WriteStatus::Ignored);
        // The original block is untouched.
        assert_eq!(persistence.get_block_pair(1).unwrap().timestamp(), 10);
    }

    #[test]
    fn test_future_write_is_out_of_order() {
        let persistence = new_persistence();
        persistence.write_next_block(&block_pair_at(1, 10)).unwrap();
        match persistence.write_next_block(&block_pair_at(5, 50)) {
            Err(BlockStorageError::OutOfOrder { received: 5, next_desired: 2 }) => {}
            other => panic!("expected OutOfOrder, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_height_is_not_found() {
        let persistence = new_persistence();
        assert!(matches!(
            persistence.get_block_pair(1),
            Err(BlockStorageError::NotFound(1))
        ));
    }

    #[test]
    fn test_scan_pages_and_stops_on_false() {
        let persistence = new_persistence();
        for h in 1..=7 {
            persistence.write_next_block(&block_pair_at(h, h * 10)).unwrap();
        }

        let mut seen = vec![];
        persistence
            .scan_blocks(2, 3, &mut |first, page| {
                seen.push((first, page.len()));
                first < 5 // stop after the page starting at 5
            })
            .unwrap();
        assert_eq!(seen, vec![(2, 3), (5, 3)]);
    }

    #[test]
    fn test_get_block_by_tx_respects_timestamp_window() {
        let persistence = new_persistence();
        for h in 1..=3 {
            persistence.write_next_block(&block_pair_at(h, h * 100)).unwrap();
        }
        let txhash = [7u8; 32]; // test_util seeds every receipt with [7; 32]

        // Window excludes every block.
        let missed = persistence.get_block_by_tx(txhash, 300, 400).unwrap();
        assert!(missed.is_none());

        // Window includes block 2 (timestamp 200) exclusively.
        let (block, index) = persistence.get_block_by_tx(txhash, 100, 300).unwrap().unwrap();
        assert_eq!(block.height(), 2);
        assert_eq!(index, 0);
    }

    #[tokio::test]
    async fn test_tracker_follows_writes() {
        let persistence = new_persistence();
        persistence.write_next_block(&block_pair_at(1, 10)).unwrap();
        persistence.block_tracker().wait_for_block(1).await.unwrap();
        assert_eq!(persistence.block_tracker().current_height(), 1);
    }
}

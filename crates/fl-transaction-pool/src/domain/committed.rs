//! # Committed Pool
//!
//! Receipts of recently committed transactions, kept long enough that
//! any client still waiting on its submission — or resubmitting it —
//! finds the receipt instead of re-entering the pending pool. Entries
//! age out of the retention window on every commit.

use shared_types::{BlockHeight, Hash, TimestampNano, TransactionReceipt};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct CommittedEntry {
    pub receipt: TransactionReceipt,
    pub block_height: BlockHeight,
    pub block_timestamp: TimestampNano,
    pub committed_at: TimestampNano,
}

pub struct CommittedPool {
    retention: Duration,
    by_hash: HashMap<Hash, CommittedEntry>,
}

impl CommittedPool {
    pub fn new(retention: Duration) -> Self {
        Self { retention, by_hash: HashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    pub fn has(&self, txhash: &Hash) -> bool {
        self.by_hash.contains_key(txhash)
    }

    pub fn get(&self, txhash: &Hash) -> Option<&CommittedEntry> {
        self.by_hash.get(txhash)
    }

    pub fn add(
        &mut self,
        receipt: TransactionReceipt,
        block_height: BlockHeight,
        block_timestamp: TimestampNano,
        now: TimestampNano,
    ) {
        let txhash = receipt.txhash;
        self.by_hash.insert(
            txhash,
            CommittedEntry { receipt, block_height, block_timestamp, committed_at: now },
        );
    }

    /// Drop entries older than the retention window.
    pub fn prune(&mut self, now: TimestampNano) {
        let retention_nanos = self.retention.as_nanos() as TimestampNano;
        self.by_hash
            .retain(|_, entry| now.saturating_sub(entry.committed_at) < retention_nanos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::ExecutionResult;

    fn receipt(n: u8) -> TransactionReceipt {
        TransactionReceipt {
            txhash: [n; 32],
            execution_result: ExecutionResult::Success,
            output: vec![],
        }
    }

    #[test]
    fn test_add_and_lookup() {
        let mut pool = CommittedPool::new(Duration::from_secs(600));
        pool.add(receipt(1), 5, 500, 1_000);

        assert!(pool.has(&[1; 32]));
        let entry = pool.get(&[1; 32]).unwrap();
        assert_eq!(entry.block_height, 5);
        assert!(!pool.has(&[2; 32]));
    }

    #[test]
    fn test_prune_honors_retention() {
        let retention = Duration::from_secs(10);
        let mut pool = CommittedPool::new(retention);
        pool.add(receipt(1), 1, 100, 0);
        pool.add(receipt(2), 2, 200, 8_000_000_000);

        pool.prune(12_000_000_000); // 12s: entry 1 (age 12s) out, entry 2 (age 4s) kept
        assert!(!pool.has(&[1; 32]));
        assert!(pool.has(&[2; 32]));
    }
}

//! # Pending Pool
//!
//! Admitted transactions awaiting a block, keyed by txhash with FIFO
//! insertion order and a byte budget. Expired entries are swept out
//! lazily whenever a batch is drawn.

use shared_types::{Hash, SignedTransaction, TimestampNano};
use std::collections::{HashMap, VecDeque};

struct PendingEntry {
    transaction: SignedTransaction,
    size_bytes: u64,
}

pub struct PendingPool {
    max_bytes: u64,
    used_bytes: u64,
    by_hash: HashMap<Hash, PendingEntry>,
    order: VecDeque<Hash>,
}

impl PendingPool {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes, used_bytes: 0, by_hash: HashMap::new(), order: VecDeque::new() }
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    pub fn has(&self, txhash: &Hash) -> bool {
        self.by_hash.contains_key(txhash)
    }

    /// True when a transaction of `size_bytes` still fits the budget.
    pub fn has_room_for(&self, size_bytes: u64) -> bool {
        self.used_bytes + size_bytes <= self.max_bytes
    }

    /// Insert an admitted transaction. The caller has already checked
    /// duplicates and the byte budget.
    pub fn add(&mut self, txhash: Hash, transaction: SignedTransaction, size_bytes: u64) {
        self.used_bytes += size_bytes;
        self.by_hash.insert(txhash, PendingEntry { transaction, size_bytes });
        self.order.push_back(txhash);
    }

    pub fn remove(&mut self, txhash: &Hash) -> Option<SignedTransaction> {
        let entry = self.by_hash.remove(txhash)?;
        self.used_bytes -= entry.size_bytes;
        // The order queue is cleaned lazily on the next batch draw.
        Some(entry.transaction)
    }

    /// Draw up to `max_count` transactions in FIFO order, dropping
    /// entries whose timestamp fell below `min_timestamp` (expired).
    /// Drawn transactions stay pending until committed.
    pub fn get_batch(
        &mut self,
        max_count: u32,
        min_timestamp: TimestampNano,
    ) -> Vec<SignedTransaction> {
        let mut batch = Vec::new();
        let mut kept = VecDeque::with_capacity(self.order.len());

        while let Some(txhash) = self.order.pop_front() {
            let Some(entry) = self.by_hash.get(&txhash) else {
                continue; // removed on commit, queue entry is stale
            };
            if entry.transaction.transaction.timestamp < min_timestamp {
                let removed = self.by_hash.remove(&txhash).unwrap_or_else(|| unreachable!());
                self.used_bytes -= removed.size_bytes;
                continue;
            }
            if (batch.len() as u32) < max_count {
                batch.push(entry.transaction.clone());
            }
            kept.push_back(txhash);
        }
        self.order = kept;
        batch
    }
}

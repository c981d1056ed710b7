//! # Ports
//!
//! The persistence seam under the snapshot ring. The ring folds evicted
//! snapshots into this base store; reads fall through to it when no
//! retained revision covers the key.

use shared_types::{merge_chain_state, BlockHeight, ChainState, Hash, TimestampNano};
use std::collections::HashMap;

/// Base store for state that has rotated out of the snapshot ring.
pub trait StatePersistence: Send + Sync {
    /// Fold one evicted snapshot into the base store.
    fn write_state(
        &mut self,
        height: BlockHeight,
        timestamp: TimestampNano,
        root: Hash,
        diff: &ChainState,
    ) -> Result<(), String>;

    /// Read one key from the base store.
    fn read_record(&self, contract: &str, key: &[u8]) -> Result<Option<Vec<u8>>, String>;

    /// Height, timestamp, and root of the base store.
    fn read_base(&self) -> (BlockHeight, TimestampNano, Hash);
}

/// In-memory base store: the materialized chain state at the oldest
/// retained height.
pub struct InMemoryStatePersistence {
    state: ChainState,
    height: BlockHeight,
    timestamp: TimestampNano,
    root: Hash,
}

impl InMemoryStatePersistence {
    pub fn new(genesis_root: Hash) -> Self {
        Self { state: HashMap::new(), height: 0, timestamp: 0, root: genesis_root }
    }
}

impl StatePersistence for InMemoryStatePersistence {
    fn write_state(
        &mut self,
        height: BlockHeight,
        timestamp: TimestampNano,
        root: Hash,
        diff: &ChainState,
    ) -> Result<(), String> {
        merge_chain_state(&mut self.state, diff);
        self.height = height;
        self.timestamp = timestamp;
        self.root = root;
        Ok(())
    }

    fn read_record(&self, contract: &str, key: &[u8]) -> Result<Option<Vec<u8>>, String> {
        Ok(self.state.get(contract).and_then(|records| records.get(key)).cloned())
    }

    fn read_base(&self) -> (BlockHeight, TimestampNano, Hash) {
        (self.height, self.timestamp, self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{inflate_chain_state, ContractStateDiff, StateRecord};

    #[test]
    fn test_in_memory_persistence_folds_diffs() {
        let mut persistence = InMemoryStatePersistence::new([0; 32]);
        let diff = inflate_chain_state(&[ContractStateDiff {
            contract_name: "c".into(),
            records: vec![StateRecord::new(*b"k", *b"v1")],
        }]);
        persistence.write_state(1, 100, [1; 32], &diff).unwrap();

        assert_eq!(persistence.read_record("c", b"k").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(persistence.read_record("c", b"missing").unwrap(), None);
        assert_eq!(persistence.read_base(), (1, 100, [1; 32]));
    }
}

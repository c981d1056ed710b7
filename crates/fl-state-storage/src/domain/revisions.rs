//! # Rolling Revisions
//!
//! The snapshot ring: the last N committed state diffs layered over the
//! persistence base, each pinned to its Merkle root. Reads at height H
//! walk the retained layers newest-first down to H, then fall through to
//! the base. When the ring rotates, the oldest layer is folded into the
//! base and its forest root is forgotten.

use crate::domain::merkle::{Forest, TrieId};
use crate::errors::StateStorageError;
use crate::ports::StatePersistence;
use shared_types::{
    inflate_chain_state, BlockHeight, ChainState, ContractStateDiff, Hash, TimestampNano,
};
use std::collections::VecDeque;
use tracing::debug;

struct Revision {
    height: BlockHeight,
    timestamp: TimestampNano,
    root: Hash,
    trie_id: TrieId,
    diff: ChainState,
}

/// Snapshot ring plus the forest it pins roots into.
pub struct RollingRevisions {
    persistence: Box<dyn StatePersistence>,
    forest: Forest,
    history_size: usize,
    revisions: VecDeque<Revision>,
    current_height: BlockHeight,
    current_timestamp: TimestampNano,
}

impl RollingRevisions {
    pub fn new(persistence: Box<dyn StatePersistence>, history_size: usize, forest: Forest) -> Self {
        let (height, timestamp, _) = persistence.read_base();
        Self {
            persistence,
            forest,
            history_size: history_size.max(1),
            revisions: VecDeque::new(),
            current_height: height,
            current_timestamp: timestamp,
        }
    }

    pub fn current_height(&self) -> BlockHeight {
        self.current_height
    }

    pub fn current_timestamp(&self) -> TimestampNano {
        self.current_timestamp
    }

    pub fn history_size(&self) -> usize {
        self.history_size
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn forest_mut(&mut self) -> &mut Forest {
        &mut self.forest
    }

    /// Append the next height's diff: fold into the forest, push a ring
    /// layer, rotate the ring if it overflows.
    ///
    /// The caller has already checked contiguity; a height that is not
    /// `current + 1` is an invariant violation here.
    pub fn add_revision(
        &mut self,
        height: BlockHeight,
        timestamp: TimestampNano,
        diffs: &[ContractStateDiff],
    ) -> Result<(), StateStorageError> {
        assert_eq!(
            height,
            self.current_height + 1,
            "revision height must be contiguous"
        );

        let trie_id = self.forest.update(diffs);
        let root = self.forest.root_hash(trie_id)?;
        self.revisions.push_back(Revision {
            height,
            timestamp,
            root,
            trie_id,
            diff: inflate_chain_state(diffs),
        });
        self.current_height = height;
        self.current_timestamp = timestamp;

        while self.revisions.len() > self.history_size {
            let evicted = self.revisions.pop_front().unwrap_or_else(|| unreachable!());
            debug!(height = evicted.height, "state snapshot rotated into base store");
            self.persistence
                .write_state(evicted.height, evicted.timestamp, evicted.root, &evicted.diff)
                .map_err(StateStorageError::Persistence)?;
            self.forest.forget_roots_below(evicted.trie_id + 1);
        }
        Ok(())
    }

    /// Read one key as of `height`. `None` means the key is absent
    /// (implicitly the empty value). The caller has already bounded
    /// `height` to the retained window.
    pub fn get_record(
        &self,
        height: BlockHeight,
        contract: &str,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, StateStorageError> {
        for revision in self.revisions.iter().rev() {
            if revision.height > height {
                continue;
            }
            if let Some(value) = revision.diff.get(contract).and_then(|records| records.get(key)) {
                return Ok(Some(value.clone()));
            }
        }
        self.persistence
            .read_record(contract, key)
            .map_err(StateStorageError::Persistence)
    }

    /// Merkle root at `height`, if retained.
    pub fn get_revision_root(&self, height: BlockHeight) -> Result<Hash, StateStorageError> {
        if let Some(revision) = self.revisions.iter().find(|r| r.height == height) {
            return Ok(revision.root);
        }
        let (base_height, _, base_root) = self.persistence.read_base();
        if height == base_height {
            return Ok(base_root);
        }
        if height == 0 {
            // Empty chain: the empty-trie root.
            return Ok(self.forest.root_hash(0)?);
        }
        Err(StateStorageError::UnknownRoot(height))
    }

    /// Trie id backing the revision at `height` (for proof extraction).
    pub fn get_revision_trie_id(&self, height: BlockHeight) -> Option<TrieId> {
        if height == 0 {
            return Some(0);
        }
        self.revisions.iter().find(|r| r.height == height).map(|r| r.trie_id)
    }
}

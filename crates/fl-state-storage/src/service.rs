//! # State Storage Service
//!
//! The storage API the rest of the node talks to. A single read/write
//! lock guards the snapshot ring and the forest; commits are serialized
//! by height, readers share the lock and may park on the block tracker
//! (bounded by the grace timeout) for heights that are about to land.

use crate::domain::merkle::Proof;
use crate::domain::revisions::RollingRevisions;
use crate::errors::StateStorageError;
use crate::ports::StatePersistence;
use crate::Forest;
use shared_types::{
    BlockHeight, BlockTracker, ContractStateDiff, Hash, StateRecord, TimestampNano, TrackerError,
};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Tunables for the state storage service.
#[derive(Clone, Debug)]
pub struct StateStorageConfig {
    /// How many per-height snapshots the ring retains.
    pub history_snapshot_count: u32,
    /// How far past the chain head a reader may wait.
    pub tracker_grace_distance: u64,
    /// How long a reader may wait for an upcoming height.
    pub tracker_grace_timeout: Duration,
}

/// Returned by [`StateStorageService::commit_state_diff`]; stale commits
/// are not errors, the caller just learns what height is wanted next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommitStateDiffOutput {
    pub next_desired_block_height: BlockHeight,
}

/// Per-height state snapshots with a Merkle commitment per height.
pub struct StateStorageService {
    config: StateStorageConfig,
    tracker: BlockTracker,
    revisions: RwLock<RollingRevisions>,
}

impl StateStorageService {
    pub fn new(config: StateStorageConfig, persistence: Box<dyn StatePersistence>) -> Self {
        let forest = Forest::new();
        let revisions =
            RollingRevisions::new(persistence, config.history_snapshot_count as usize, forest);
        let tracker = BlockTracker::new(revisions.current_height(), config.tracker_grace_distance);
        Self { config, tracker, revisions: RwLock::new(revisions) }
    }

    /// The tracker readers use to await committed heights.
    pub fn block_tracker(&self) -> &BlockTracker {
        &self.tracker
    }

    /// Apply the state diff of block `height`.
    ///
    /// Idempotent for stale heights: anything other than `current + 1`
    /// is a no-op that reports the next desired height.
    pub async fn commit_state_diff(
        &self,
        height: BlockHeight,
        timestamp: TimestampNano,
        diffs: &[ContractStateDiff],
    ) -> Result<CommitStateDiffOutput, StateStorageError> {
        let mut revisions = self.revisions.write().await;

        let current = revisions.current_height();
        if height != current + 1 {
            debug!(height, current, "stale state commit ignored");
            return Ok(CommitStateDiffOutput { next_desired_block_height: current + 1 });
        }

        revisions.add_revision(height, timestamp, diffs)?;
        // Advance the tracker before releasing the lock so concurrent
        // commits cannot reorder the wakeups.
        self.tracker.increment_to(height);
        drop(revisions);

        info!(height, diffs = diffs.len(), "state diff committed");
        Ok(CommitStateDiffOutput { next_desired_block_height: height + 1 })
    }

    /// Read `keys` under `contract` as of `height`. Missing keys come
    /// back as records with the empty value.
    pub async fn read_keys(
        &self,
        height: BlockHeight,
        contract: &str,
        keys: &[Vec<u8>],
    ) -> Result<Vec<StateRecord>, StateStorageError> {
        self.wait_within_grace(height).await?;

        let revisions = self.revisions.read().await;
        self.check_not_evicted(height, &revisions)?;

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            let value = revisions.get_record(height, contract, key)?.unwrap_or_default();
            records.push(StateRecord { key: key.clone(), value });
        }
        Ok(records)
    }

    /// Merkle root of the state at `height`.
    pub async fn get_state_hash(&self, height: BlockHeight) -> Result<Hash, StateStorageError> {
        self.wait_within_grace(height).await?;

        let revisions = self.revisions.read().await;
        self.check_not_evicted(height, &revisions)?;
        revisions.get_revision_root(height)
    }

    /// Extract a proof for `(contract, key)` at `height`, together with
    /// the root it verifies against.
    pub async fn get_proof(
        &self,
        height: BlockHeight,
        contract: &str,
        key: &[u8],
    ) -> Result<(Hash, Proof), StateStorageError> {
        let revisions = self.revisions.read().await;
        self.check_not_evicted(height, &revisions)?;
        let trie_id = revisions
            .get_revision_trie_id(height)
            .ok_or(StateStorageError::UnknownRoot(height))?;
        let root = revisions.get_revision_root(height)?;
        let proof = revisions.forest().get_proof(trie_id, contract, key)?;
        Ok((root, proof))
    }

    /// Root that `diffs` would produce on top of the current height,
    /// without committing. Used for proposal post-execution roots.
    pub async fn project_root(
        &self,
        base_height: BlockHeight,
        diffs: &[ContractStateDiff],
    ) -> Result<Hash, StateStorageError> {
        let mut revisions = self.revisions.write().await;
        let current = revisions.current_height();
        if base_height != current {
            return Err(StateStorageError::StaleProjectionBase { base: base_height, current });
        }
        let base_root = revisions.get_revision_root(current)?;
        Ok(revisions.forest_mut().project(base_root, diffs))
    }

    /// Last committed height and its timestamp.
    pub async fn get_last_committed(&self) -> (BlockHeight, TimestampNano) {
        let revisions = self.revisions.read().await;
        (revisions.current_height(), revisions.current_timestamp())
    }

    async fn wait_within_grace(&self, height: BlockHeight) -> Result<(), StateStorageError> {
        let wait = self.tracker.wait_for_block(height);
        match tokio::time::timeout(self.config.tracker_grace_timeout, wait).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(TrackerError::OutOfGraceRange { requested, current, .. })) => {
                Err(StateStorageError::OutOfGraceRange { requested, current })
            }
            Err(_) => Err(StateStorageError::Timeout(height)),
        }
    }

    fn check_not_evicted(
        &self,
        height: BlockHeight,
        revisions: &RollingRevisions,
    ) -> Result<(), StateStorageError> {
        let current = revisions.current_height();
        let history = self.config.history_snapshot_count;
        if height + history as u64 <= current {
            return Err(StateStorageError::TooOld { height, current, history });
        }
        Ok(())
    }
}

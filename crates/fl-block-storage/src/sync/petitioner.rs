//! # Block Sync Petitioner
//!
//! An edge-triggered state machine that catches a lagging node up:
//!
//! ```text
//! Idle ──(no commit for no_commit_interval)──► CollectingAvailabilityResponses
//! Collecting ──(broadcast error)──────────────► Idle
//! Collecting ──(collect_responses_timeout)────► FinishedCAR
//! FinishedCAR ──(≥1 usable response)──────────► WaitingForChunks(source)
//! FinishedCAR ──(none)────────────────────────► Idle
//! Waiting ──(send error / timeout / stranger)─► Idle
//! Waiting ──(chunk from expected source)──────► ProcessingBlocks
//! Processing ──(all applied / first failure)──► Idle
//! any ──(shutdown)────────────────────────────► terminal
//! ```
//!
//! Gossip events land in a bounded inbox with a non-blocking send;
//! events that arrive in a state that does not expect them are drained
//! and dropped. Entering Idle informs consensus of our position in
//! update-only mode.

use crate::ports::{BlockConsensusHandler, BlockSyncGossip, HandleBlockConsensusMode};
use crate::service::BlockStorageService;
use fl_gossip::BlockSyncRange;
use rand::Rng;
use shared_types::{BlockPair, BlockType, NodeAddress};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

const EVENT_INBOX_CAPACITY: usize = 64;

/// Sync timers and identity.
#[derive(Clone, Debug)]
pub struct BlockSyncConfig {
    pub node_address: NodeAddress,
    pub batch_size: u32,
    pub no_commit_interval: Duration,
    pub collect_responses_timeout: Duration,
    pub collect_chunks_timeout: Duration,
}

/// Gossip events the petitioner reacts to.
#[derive(Debug)]
pub enum SyncEvent {
    AvailabilityResponse {
        sender: NodeAddress,
        range: BlockSyncRange,
    },
    Blocks {
        sender: NodeAddress,
        range: BlockSyncRange,
        blocks: Vec<BlockPair>,
    },
}

/// Non-blocking handle the gossip listener uses to feed the petitioner.
#[derive(Clone)]
pub struct SyncEventSender(mpsc::Sender<SyncEvent>);

impl SyncEventSender {
    /// Deliver without blocking; a full inbox drops the event.
    pub fn deliver(&self, event: SyncEvent) {
        if self.0.try_send(event).is_err() {
            debug!("sync event inbox full, event dropped");
        }
    }
}

enum SyncState {
    Idle,
    CollectingAvailabilityResponses,
    FinishedCar {
        responses: Vec<(NodeAddress, BlockSyncRange)>,
    },
    WaitingForChunks {
        source: NodeAddress,
    },
    ProcessingBlocks {
        blocks: Vec<BlockPair>,
    },
    Terminated,
}

pub struct BlockSyncPetitioner {
    config: BlockSyncConfig,
    storage: Arc<BlockStorageService>,
    gossip: Arc<dyn BlockSyncGossip>,
    consensus: Arc<dyn BlockConsensusHandler>,
}

impl BlockSyncPetitioner {
    pub fn new(
        config: BlockSyncConfig,
        storage: Arc<BlockStorageService>,
        gossip: Arc<dyn BlockSyncGossip>,
        consensus: Arc<dyn BlockConsensusHandler>,
    ) -> Self {
        Self { config, storage, gossip, consensus }
    }

    /// Create the event inbox for this petitioner.
    pub fn event_channel() -> (SyncEventSender, mpsc::Receiver<SyncEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_INBOX_CAPACITY);
        (SyncEventSender(tx), rx)
    }

    /// Drive the state machine until shutdown. Takes the inbox by
    /// mutable borrow so a supervisor can restart the loop without
    /// losing queued events.
    pub async fn run(
        &self,
        events: &mut mpsc::Receiver<SyncEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut state = SyncState::Idle;
        loop {
            if *shutdown.borrow() {
                return;
            }
            state = match state {
                SyncState::Idle => self.process_idle(events, &mut shutdown).await,
                SyncState::CollectingAvailabilityResponses => {
                    self.process_collecting(events).await
                }
                SyncState::FinishedCar { responses } => self.process_finished_car(responses),
                SyncState::WaitingForChunks { source } => {
                    self.process_waiting(source, events).await
                }
                SyncState::ProcessingBlocks { blocks } => self.process_blocks(blocks).await,
                SyncState::Terminated => return,
            };
        }
    }

    async fn process_idle(
        &self,
        events: &mut mpsc::Receiver<SyncEvent>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SyncState {
        // Entering Idle: report our position, update-only.
        let last_block = self.storage.get_last_block().ok().flatten();
        let _ = self
            .consensus
            .handle_block_consensus(HandleBlockConsensusMode::UpdateOnly, last_block.as_ref(), None)
            .await;

        let timer = tokio::time::sleep(self.config.no_commit_interval);
        tokio::pin!(timer);

        loop {
            let current = match self.storage.get_last_block_height() {
                Ok(height) => height,
                Err(e) => {
                    warn!(error = %e, "sync cannot read chain height");
                    return SyncState::Idle;
                }
            };
            tokio::select! {
                _ = shutdown.changed() => return SyncState::Terminated,
                _ = &mut timer => {
                    info!(height = current, "no commit within interval, starting block sync");
                    return SyncState::CollectingAvailabilityResponses;
                }
                result = self.storage.block_tracker().wait_for_block(current + 1) => {
                    // A commit arrived through consensus; stay idle and
                    // rearm the timer.
                    if result.is_ok() {
                        timer.as_mut().reset(
                            tokio::time::Instant::now() + self.config.no_commit_interval,
                        );
                    }
                }
                event = events.recv() => {
                    match event {
                        None => return SyncState::Terminated,
                        Some(_) => {} // wrong-state event, dropped
                    }
                }
            }
        }
    }

    async fn process_collecting(&self, events: &mut mpsc::Receiver<SyncEvent>) -> SyncState {
        let current = self.storage.get_last_block_height().unwrap_or(0);
        let request = BlockSyncRange {
            block_type: BlockType::BlockPair,
            first_block_height: current + 1,
            last_block_height: current + self.config.batch_size as u64,
            last_committed_block_height: current,
        };
        if let Err(e) = self.gossip.broadcast_block_availability_request(request).await {
            warn!(error = %e, "availability broadcast failed");
            return SyncState::Idle;
        }

        let deadline = tokio::time::Instant::now() + self.config.collect_responses_timeout;
        let mut responses = Vec::new();
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    return SyncState::FinishedCar { responses };
                }
                event = events.recv() => {
                    match event {
                        None => return SyncState::Terminated,
                        Some(SyncEvent::AvailabilityResponse { sender, range })
                            if sender != self.config.node_address =>
                        {
                            debug!(%sender, last_committed = range.last_committed_block_height,
                                "availability response collected");
                            responses.push((sender, range));
                        }
                        Some(_) => {} // wrong-state or own event, dropped
                    }
                }
            }
        }
    }

    fn process_finished_car(
        &self,
        responses: Vec<(NodeAddress, BlockSyncRange)>,
    ) -> SyncState {
        let current = self.storage.get_last_block_height().unwrap_or(0);
        let candidates: Vec<_> = responses
            .into_iter()
            .filter(|(_, range)| range.last_committed_block_height > current)
            .collect();
        if candidates.is_empty() {
            debug!("no usable availability responses, returning to idle");
            return SyncState::Idle;
        }
        let (source, range) = &candidates[rand::thread_rng().gen_range(0..candidates.len())];
        info!(%source, available = range.last_committed_block_height, "sync source chosen");
        SyncState::WaitingForChunks { source: *source }
    }

    async fn process_waiting(
        &self,
        source: NodeAddress,
        events: &mut mpsc::Receiver<SyncEvent>,
    ) -> SyncState {
        let current = self.storage.get_last_block_height().unwrap_or(0);
        let request = BlockSyncRange {
            block_type: BlockType::BlockPair,
            first_block_height: current + 1,
            last_block_height: current + self.config.batch_size as u64,
            last_committed_block_height: current,
        };
        if let Err(e) = self.gossip.send_block_sync_request(source, request).await {
            warn!(%source, error = %e, "block sync request failed");
            return SyncState::Idle;
        }

        let deadline = tokio::time::Instant::now() + self.config.collect_chunks_timeout;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    debug!(%source, "chunk wait timed out");
                    return SyncState::Idle;
                }
                event = events.recv() => {
                    match event {
                        None => return SyncState::Terminated,
                        Some(SyncEvent::Blocks { sender, range, blocks }) => {
                            if sender != source {
                                debug!(%sender, expected = %source,
                                    "chunk from unexpected source, aborting sync");
                                return SyncState::Idle;
                            }
                            if blocks.is_empty() || range.first_block_height != current + 1 {
                                debug!(first = range.first_block_height,
                                    expected = current + 1,
                                    "chunk outside expected window, discarded");
                                return SyncState::Idle;
                            }
                            return SyncState::ProcessingBlocks { blocks };
                        }
                        Some(_) => {} // wrong-state event, dropped
                    }
                }
            }
        }
    }

    async fn process_blocks(&self, blocks: Vec<BlockPair>) -> SyncState {
        let mut prev_block = self.storage.get_last_block().ok().flatten();
        for block in blocks {
            let height = block.height();
            if height <= self.storage.get_last_block_height().unwrap_or(0) {
                continue; // stale half of the chunk
            }

            let validation = self
                .consensus
                .handle_block_consensus(
                    HandleBlockConsensusMode::VerifyAndUpdate,
                    Some(&block),
                    prev_block.as_ref(),
                )
                .await;
            if let Err(e) = validation {
                warn!(height, error = %e, "synced block failed validation, aborting chunk");
                return SyncState::Idle;
            }

            if let Err(e) = self.storage.commit_block(&block).await {
                warn!(height, error = %e, "synced block failed to commit, aborting chunk");
                return SyncState::Idle;
            }
            debug!(height, "synced block committed");
            prev_block = Some(block);
        }
        SyncState::Idle
    }
}

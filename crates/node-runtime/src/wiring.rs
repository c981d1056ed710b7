//! # Wiring
//!
//! Adapters bridging the per-edge capability traits between crates.
//! The service cycle (pool ↔ consensus ↔ VM ↔ state ↔ blocks) is broken
//! here: every edge is an `Arc` adapter handed over at construction.

use async_trait::async_trait;
use fl_block_storage::{
    BlockSyncGossip, PortError as StoragePortError, ReceiptCommitter, StateCommitter,
    SyncEvent, SyncEventSender,
};
use fl_consensus_context::ports::{
    PortError as CtxPortError, StateRootReader, TransactionBatchSource,
};
use fl_gossip::{BlockSyncRange, GossipMessage, Transport, TransportData, TransportListener};
use fl_state_storage::StateStorageService;
use fl_transaction_pool::ports::{PortError as PoolPortError, TransactionForwarder};
use fl_transaction_pool::TransactionPoolService;
use shared_types::{
    BlockHeight, BlockPair, ContractStateDiff, Hash, NodeAddress, SignedTransaction,
    TimestampNano, TransactionReceipt,
};
use std::sync::Arc;
use tracing::{debug, warn};

// ---------------------------------------------------------------------
// Storage-side edges
// ---------------------------------------------------------------------

/// Block storage → state storage.
pub struct StateCommitAdapter(pub Arc<StateStorageService>);

#[async_trait]
impl StateCommitter for StateCommitAdapter {
    async fn commit_state_diff(
        &self,
        height: BlockHeight,
        timestamp: TimestampNano,
        diffs: &[ContractStateDiff],
    ) -> Result<(), StoragePortError> {
        self.0
            .commit_state_diff(height, timestamp, diffs)
            .await
            .map(|_| ())
            .map_err(|e| StoragePortError(e.to_string()))
    }
}

/// Block storage → transaction pool.
pub struct ReceiptCommitAdapter(pub Arc<TransactionPoolService>);

#[async_trait]
impl ReceiptCommitter for ReceiptCommitAdapter {
    async fn commit_transaction_receipts(
        &self,
        height: BlockHeight,
        timestamp: TimestampNano,
        receipts: &[TransactionReceipt],
    ) -> Result<(), StoragePortError> {
        let _next_desired = self.0.commit_transaction_receipts(height, timestamp, receipts).await;
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Consensus-context edges
// ---------------------------------------------------------------------

/// Consensus context → transaction pool.
pub struct BatchSourceAdapter(pub Arc<TransactionPoolService>);

#[async_trait]
impl TransactionBatchSource for BatchSourceAdapter {
    async fn get_transactions_for_ordering(&self, max_count: u32) -> Vec<SignedTransaction> {
        self.0.get_transactions_for_ordering(max_count).await
    }
}

/// Consensus context → state storage.
pub struct StateRootAdapter(pub Arc<StateStorageService>);

#[async_trait]
impl StateRootReader for StateRootAdapter {
    async fn get_state_hash(&self, height: BlockHeight) -> Result<Hash, CtxPortError> {
        self.0.get_state_hash(height).await.map_err(|e| CtxPortError(e.to_string()))
    }

    async fn project_root(
        &self,
        base_height: BlockHeight,
        diffs: &[ContractStateDiff],
    ) -> Result<Hash, CtxPortError> {
        self.0.project_root(base_height, diffs).await.map_err(|e| CtxPortError(e.to_string()))
    }
}

// ---------------------------------------------------------------------
// Gossip edges
// ---------------------------------------------------------------------

/// Outgoing gossip: encodes topic messages and addresses the transport.
pub struct GossipSender {
    node_address: NodeAddress,
    transport: Arc<dyn Transport>,
}

impl GossipSender {
    pub fn new(node_address: NodeAddress, transport: Arc<dyn Transport>) -> Self {
        Self { node_address, transport }
    }

    pub fn node_address(&self) -> NodeAddress {
        self.node_address
    }

    async fn broadcast(&self, message: GossipMessage) -> Result<(), String> {
        let data = TransportData::broadcast(self.node_address, vec![message.encode()]);
        self.transport.send(data).await.map_err(|e| e.to_string())
    }

    async fn send_to(&self, recipient: NodeAddress, message: GossipMessage) -> Result<(), String> {
        let data =
            TransportData::to_list(self.node_address, vec![recipient], vec![message.encode()]);
        self.transport.send(data).await.map_err(|e| e.to_string())
    }

    /// Leader → federation: a freshly committed block.
    pub async fn broadcast_block_committed(&self, block: BlockPair) -> Result<(), String> {
        self.broadcast(GossipMessage::BlockCommitted {
            sender: self.node_address,
            block: Box::new(block),
        })
        .await
    }
}

#[async_trait]
impl BlockSyncGossip for GossipSender {
    async fn broadcast_block_availability_request(
        &self,
        range: BlockSyncRange,
    ) -> Result<(), StoragePortError> {
        self.broadcast(GossipMessage::BlockAvailabilityRequest {
            sender: self.node_address,
            range,
        })
        .await
        .map_err(StoragePortError)
    }

    async fn send_block_availability_response(
        &self,
        recipient: NodeAddress,
        range: BlockSyncRange,
    ) -> Result<(), StoragePortError> {
        self.send_to(
            recipient,
            GossipMessage::BlockAvailabilityResponse { sender: self.node_address, range },
        )
        .await
        .map_err(StoragePortError)
    }

    async fn send_block_sync_request(
        &self,
        recipient: NodeAddress,
        range: BlockSyncRange,
    ) -> Result<(), StoragePortError> {
        self.send_to(recipient, GossipMessage::BlockSyncRequest { sender: self.node_address, range })
            .await
            .map_err(StoragePortError)
    }

    async fn send_block_sync_response(
        &self,
        recipient: NodeAddress,
        range: BlockSyncRange,
        blocks: Vec<BlockPair>,
    ) -> Result<(), StoragePortError> {
        self.send_to(
            recipient,
            GossipMessage::BlockSyncResponse { sender: self.node_address, range, blocks },
        )
        .await
        .map_err(StoragePortError)
    }
}

#[async_trait]
impl TransactionForwarder for GossipSender {
    async fn forward_transactions(
        &self,
        transactions: Vec<SignedTransaction>,
    ) -> Result<(), PoolPortError> {
        // All-but-list keeps the relay from echoing to the origin even
        // on transports that do not special-case the sender.
        let message =
            GossipMessage::ForwardedTransactions { sender: self.node_address, transactions };
        let data = TransportData::all_but(
            self.node_address,
            vec![self.node_address],
            vec![message.encode()],
        );
        self.transport.send(data).await.map_err(|e| PoolPortError(e.to_string()))
    }
}

// ---------------------------------------------------------------------
// Incoming gossip dispatch
// ---------------------------------------------------------------------

/// Decodes incoming payloads and routes each topic to its subsystem.
pub struct GossipDispatcher {
    pub pool: Arc<TransactionPoolService>,
    pub sync_source: Arc<fl_block_storage::BlockSyncSource>,
    pub sync_events: SyncEventSender,
    pub consensus: Arc<crate::consensus::BenchmarkConsensus>,
}

#[async_trait]
impl TransportListener for GossipDispatcher {
    async fn on_transport_message_received(&self, payloads: Vec<Vec<u8>>) {
        for payload in payloads {
            let message = match GossipMessage::decode(&payload) {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "undecodable gossip payload dropped");
                    continue;
                }
            };
            self.dispatch(message).await;
        }
    }
}

impl GossipDispatcher {
    async fn dispatch(&self, message: GossipMessage) {
        match message {
            GossipMessage::ForwardedTransactions { sender, transactions } => {
                debug!(%sender, count = transactions.len(), "forwarded transactions received");
                self.pool.handle_forwarded_transactions(transactions).await;
            }
            GossipMessage::BlockAvailabilityRequest { sender, range } => {
                if let Err(e) =
                    self.sync_source.handle_block_availability_request(sender, range).await
                {
                    debug!(%sender, error = %e, "availability request handling failed");
                }
            }
            GossipMessage::BlockAvailabilityResponse { sender, range } => {
                self.sync_events.deliver(SyncEvent::AvailabilityResponse { sender, range });
            }
            GossipMessage::BlockSyncRequest { sender, range } => {
                if let Err(e) = self.sync_source.handle_block_sync_request(sender, range).await {
                    debug!(%sender, error = %e, "sync request handling failed");
                }
            }
            GossipMessage::BlockSyncResponse { sender, range, blocks } => {
                self.sync_events.deliver(SyncEvent::Blocks { sender, range, blocks });
            }
            GossipMessage::BlockCommitted { sender, block } => {
                self.consensus.handle_committed_block_broadcast(sender, *block).await;
            }
        }
    }
}

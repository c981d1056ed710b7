//! # Node Assembly
//!
//! Leaf-first construction of every subsystem, connected through the
//! per-edge adapters in `wiring`, plus lifecycle: supervised tasks for
//! the leader loop and the block sync petitioner, and a shutdown switch
//! that drains everything.

use crate::consensus::{BenchmarkConsensus, BenchmarkConsensusConfig};
use crate::processor::NativeProcessor;
use crate::startup::{self, StartupError};
use crate::supervisor::spawn_supervised;
use crate::wiring::{
    BatchSourceAdapter, GossipDispatcher, GossipSender, ReceiptCommitAdapter, StateCommitAdapter,
    StateRootAdapter,
};
use fl_block_storage::{
    BlockFileConfig, BlockPersistence, BlockStorageService, BlockSyncConfig, BlockSyncPetitioner,
    BlockSyncSource, FilesystemBlockPersistence, InMemoryBlockPersistence,
};
use fl_consensus_context::{ConsensusContextConfig, ConsensusContextService};
use fl_gossip::Transport;
use fl_state_storage::{
    Forest, InMemoryStatePersistence, StateStorageConfig, StateStorageService,
};
use fl_transaction_pool::{TransactionPoolConfig, TransactionPoolService};
use shared_types::NodeConfig;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

pub struct Node {
    pub config: NodeConfig,
    pub state_storage: Arc<StateStorageService>,
    pub transaction_pool: Arc<TransactionPoolService>,
    pub block_storage: Arc<BlockStorageService>,
    pub consensus_context: Arc<ConsensusContextService>,
    pub consensus: Arc<BenchmarkConsensus>,
    shutdown: watch::Sender<bool>,
}

impl Node {
    /// Validate, build, wire, and start a node over `transport`.
    pub async fn start(
        config: NodeConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Arc<Self>, StartupError> {
        let keypair = Arc::new(startup::validate_config(&config)?);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // State storage.
        let state_storage = Arc::new(StateStorageService::new(
            StateStorageConfig {
                history_snapshot_count: config.state_history_snapshot_count,
                tracker_grace_distance: config.block_tracker_grace_distance,
                tracker_grace_timeout: config.block_tracker_grace_timeout,
            },
            Box::new(InMemoryStatePersistence::new(Forest::new().top_root_hash())),
        ));

        // Virtual machine and gossip egress.
        let processor = Arc::new(NativeProcessor::new(state_storage.clone()));
        let gossip_sender = Arc::new(GossipSender::new(config.node_address, transport.clone()));

        // Transaction pool.
        let transaction_pool = Arc::new(TransactionPoolService::new(
            TransactionPoolConfig {
                protocol_version: config.protocol_version,
                virtual_chain_id: config.virtual_chain_id,
                pending_pool_size_bytes: config.pending_pool_size_bytes,
                committed_pool_retention: config.committed_pool_retention,
                tx_timestamp_past_window: config.tx_timestamp_past_window,
                tx_timestamp_future_window: config.tx_timestamp_future_window,
                transaction_ordering_wait: config.transaction_ordering_wait,
            },
            processor.clone(),
            gossip_sender.clone(),
        ));

        // Block persistence and the commit path.
        let persistence: Arc<dyn BlockPersistence> = match &config.data_dir {
            Some(dir) => Arc::new(
                FilesystemBlockPersistence::open(&BlockFileConfig {
                    dir: dir.clone(),
                    network_id: config.network_id,
                    virtual_chain_id: config.virtual_chain_id,
                    tracker_grace_distance: config.block_tracker_grace_distance,
                })
                .map_err(|e| StartupError::Other(e.to_string()))?,
            ),
            None => {
                Arc::new(InMemoryBlockPersistence::new(config.block_tracker_grace_distance, vec![]))
            }
        };
        let block_storage = Arc::new(BlockStorageService::new(
            config.virtual_chain_id,
            persistence,
            Arc::new(StateCommitAdapter(state_storage.clone())),
            Arc::new(ReceiptCommitAdapter(transaction_pool.clone())),
        ));

        // Consensus context and engine.
        let consensus_context = Arc::new(ConsensusContextService::new(
            ConsensusContextConfig {
                protocol_version: config.protocol_version,
                virtual_chain_id: config.virtual_chain_id,
                max_transactions_per_block: config.max_transactions_per_block,
                genesis_federation: config
                    .genesis_federation
                    .iter()
                    .map(|node| node.address)
                    .collect(),
            },
            Arc::new(BatchSourceAdapter(transaction_pool.clone())),
            processor.clone(),
            Arc::new(StateRootAdapter(state_storage.clone())),
        ));
        let consensus = Arc::new(BenchmarkConsensus::new(
            BenchmarkConsensusConfig {
                node_address: config.node_address,
                leader_address: config.constant_consensus_leader,
                empty_block_time: config.empty_block_time,
                retry_interval: config.benchmark_consensus_retry_interval,
            },
            keypair.clone(),
            consensus_context.clone(),
            block_storage.clone(),
            gossip_sender.clone(),
        ));

        // Block sync, both roles.
        let petitioner = Arc::new(BlockSyncPetitioner::new(
            BlockSyncConfig {
                node_address: config.node_address,
                batch_size: config.block_sync_batch_size,
                no_commit_interval: config.block_sync_no_commit_interval,
                collect_responses_timeout: config.block_sync_collect_response_timeout,
                collect_chunks_timeout: config.block_sync_collect_chunks_timeout,
            },
            block_storage.clone(),
            gossip_sender.clone(),
            consensus.clone(),
        ));
        let (sync_events, sync_inbox) = BlockSyncPetitioner::event_channel();
        let sync_source = Arc::new(BlockSyncSource::new(
            config.block_sync_batch_size,
            block_storage.clone(),
            gossip_sender.clone(),
        ));

        // Incoming gossip dispatch.
        transport.register_listener(Arc::new(GossipDispatcher {
            pool: transaction_pool.clone(),
            sync_source,
            sync_events,
            consensus: consensus.clone(),
        }));

        // Long-running roles, supervised.
        let sync_inbox = Arc::new(tokio::sync::Mutex::new(sync_inbox));
        spawn_supervised("block-sync", shutdown_rx.clone(), {
            let petitioner = petitioner.clone();
            let sync_inbox = sync_inbox.clone();
            let shutdown = shutdown_rx.clone();
            move || {
                let petitioner = petitioner.clone();
                let sync_inbox = sync_inbox.clone();
                let shutdown = shutdown.clone();
                async move {
                    let mut inbox = sync_inbox.lock().await;
                    petitioner.run(&mut inbox, shutdown).await;
                }
            }
        });
        if consensus.is_leader() {
            spawn_supervised("benchmark-consensus-leader", shutdown_rx.clone(), {
                let consensus = consensus.clone();
                let shutdown = shutdown_rx.clone();
                move || {
                    let consensus = consensus.clone();
                    let shutdown = shutdown.clone();
                    async move { consensus.run_leader_loop(shutdown).await }
                }
            });
        }

        info!(
            address = %config.node_address,
            leader = consensus.is_leader(),
            http_port = config.http_port,
            "node started"
        );
        Ok(Arc::new(Self {
            config,
            state_storage,
            transaction_pool,
            block_storage,
            consensus_context,
            consensus,
            shutdown: shutdown_tx,
        }))
    }

    /// Flip the shutdown switch; supervised tasks drain and exit.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        info!(address = %self.config.node_address, "node shutdown requested");
    }
}

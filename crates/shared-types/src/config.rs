//! # Node Configuration
//!
//! One typed struct for every tunable in the node. Values arrive from
//! the environment (see `node-runtime`), from `Default`, or from the
//! `for_tests` constructor which shrinks every interval so multi-node
//! scenarios converge in milliseconds.

use crate::federation::FederationNode;
use crate::primitives::{NodeAddress, ProtocolVersion, VirtualChainId};
use std::path::PathBuf;
use std::time::Duration;

/// Complete node configuration.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    // Identity
    pub node_address: NodeAddress,
    /// Uncompressed secp256k1 public key (65 bytes, 0x04-prefixed).
    pub node_public_key: Vec<u8>,
    /// secp256k1 secret scalar (32 bytes).
    pub node_private_key: Vec<u8>,

    // Chain identity
    pub protocol_version: ProtocolVersion,
    pub network_id: u32,
    pub virtual_chain_id: VirtualChainId,

    // Federation & consensus
    pub genesis_federation: Vec<FederationNode>,
    pub constant_consensus_leader: NodeAddress,
    pub benchmark_consensus_retry_interval: Duration,
    /// How long the leader waits for transactions before proposing an
    /// empty block.
    pub empty_block_time: Duration,
    pub max_transactions_per_block: u32,

    // Block sync
    pub block_sync_batch_size: u32,
    pub block_sync_no_commit_interval: Duration,
    pub block_sync_collect_response_timeout: Duration,
    pub block_sync_collect_chunks_timeout: Duration,

    // Block tracker
    pub block_tracker_grace_distance: u64,
    pub block_tracker_grace_timeout: Duration,

    // State storage
    pub state_history_snapshot_count: u32,

    // Transaction pool
    pub pending_pool_size_bytes: u64,
    pub committed_pool_retention: Duration,
    pub tx_timestamp_past_window: Duration,
    pub tx_timestamp_future_window: Duration,
    /// How long `get_transactions_for_ordering` waits for the first
    /// pending transaction before returning an empty batch.
    pub transaction_ordering_wait: Duration,

    // Transport
    pub gossip_listen_port: u16,
    pub keep_alive_interval: Duration,
    pub connection_retry_backoff: Duration,
    pub send_queue_max_bytes: usize,
    pub send_queue_max_messages: usize,

    // External surfaces
    /// Attach point for the (out-of-scope) RPC gateway.
    pub http_port: u16,
    pub log_path: Option<PathBuf>,
    /// Block file directory; in-memory persistence when unset.
    pub data_dir: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_address: NodeAddress::from_bytes([0; 20]),
            node_public_key: vec![],
            node_private_key: vec![],

            protocol_version: 1,
            network_id: 1,
            virtual_chain_id: 42,

            genesis_federation: vec![],
            constant_consensus_leader: NodeAddress::from_bytes([0; 20]),
            benchmark_consensus_retry_interval: Duration::from_secs(2),
            empty_block_time: Duration::from_secs(1),
            max_transactions_per_block: 1_000,

            block_sync_batch_size: 10_000,
            block_sync_no_commit_interval: Duration::from_secs(8),
            block_sync_collect_response_timeout: Duration::from_millis(500),
            block_sync_collect_chunks_timeout: Duration::from_secs(5),

            block_tracker_grace_distance: 5,
            block_tracker_grace_timeout: Duration::from_millis(100),

            state_history_snapshot_count: 5,

            pending_pool_size_bytes: 20 * 1024 * 1024,
            committed_pool_retention: Duration::from_secs(600),
            tx_timestamp_past_window: Duration::from_secs(300),
            tx_timestamp_future_window: Duration::from_secs(120),
            transaction_ordering_wait: Duration::from_millis(500),

            gossip_listen_port: 4400,
            keep_alive_interval: Duration::from_secs(2),
            connection_retry_backoff: Duration::from_millis(500),
            send_queue_max_bytes: 20 * 1024 * 1024,
            send_queue_max_messages: 1_000,

            http_port: 8080,
            log_path: None,
            data_dir: None,
        }
    }
}

impl NodeConfig {
    /// A configuration with every interval shrunk for in-process tests.
    pub fn for_tests() -> Self {
        Self {
            benchmark_consensus_retry_interval: Duration::from_millis(50),
            empty_block_time: Duration::from_millis(30),
            block_sync_no_commit_interval: Duration::from_millis(120),
            block_sync_collect_response_timeout: Duration::from_millis(30),
            block_sync_collect_chunks_timeout: Duration::from_millis(200),
            block_tracker_grace_timeout: Duration::from_millis(50),
            transaction_ordering_wait: Duration::from_millis(20),
            committed_pool_retention: Duration::from_secs(30),
            ..Self::default()
        }
    }
}

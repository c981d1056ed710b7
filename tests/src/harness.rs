//! # Network Harness
//!
//! Builds an in-process federation: N nodes over one in-memory hub,
//! each behind its own tampering transport so tests can inject faults
//! per node. Node 0 is the constant consensus leader.

use fl_gossip::{InMemoryTransportHub, TamperingTransport, Transport};
use node_runtime::Node;
use shared_crypto::{calc_tx_hash, NodeKeyPair};
use shared_types::{
    primitives::now_nano, Argument, BlockHeight, FederationNode, Hash, NodeConfig,
    SignedTransaction, Transaction, TransactionReceipt,
};
use std::sync::Arc;
use std::time::Duration;

pub struct TestNode {
    pub keypair: Arc<NodeKeyPair>,
    pub tampering: Arc<TamperingTransport>,
    pub node: Option<Arc<Node>>,
}

pub struct TestNetwork {
    pub hub: Arc<InMemoryTransportHub>,
    pub nodes: Vec<TestNode>,
    federation: Vec<FederationNode>,
    client: NodeKeyPair,
}

impl TestNetwork {
    /// Prepare `size` nodes (none started yet).
    pub fn new(size: usize) -> Self {
        let hub = InMemoryTransportHub::new();
        let keypairs: Vec<Arc<NodeKeyPair>> =
            (0..size).map(|_| Arc::new(NodeKeyPair::generate())).collect();
        let federation: Vec<FederationNode> = keypairs
            .iter()
            .enumerate()
            .map(|(i, keypair)| FederationNode {
                address: keypair.address(),
                gossip_endpoint: "127.0.0.1".into(),
                gossip_port: 4400 + i as u16,
            })
            .collect();

        let nodes = keypairs
            .into_iter()
            .map(|keypair| {
                let transport = hub.transport_for(keypair.address());
                let tampering = Arc::new(TamperingTransport::new(Arc::new(transport)));
                TestNode { keypair, tampering, node: None }
            })
            .collect();

        Self { hub, nodes, federation, client: NodeKeyPair::generate() }
    }

    fn config_for(&self, index: usize) -> NodeConfig {
        let keypair = &self.nodes[index].keypair;
        NodeConfig {
            node_address: keypair.address(),
            node_public_key: keypair.public_key(),
            node_private_key: keypair.private_key(),
            genesis_federation: self.federation.clone(),
            constant_consensus_leader: self.federation[0].address,
            ..NodeConfig::for_tests()
        }
    }

    /// Start one node; idempotent per index.
    pub async fn start_node(&mut self, index: usize) -> Arc<Node> {
        if let Some(node) = &self.nodes[index].node {
            return node.clone();
        }
        let config = self.config_for(index);
        let transport: Arc<dyn Transport> = self.nodes[index].tampering.clone();
        let node = Node::start(config, transport).await.expect("node must start");
        self.nodes[index].node = Some(node.clone());
        node
    }

    pub async fn start_all(&mut self) {
        for index in 0..self.nodes.len() {
            self.start_node(index).await;
        }
    }

    pub fn node(&self, index: usize) -> Arc<Node> {
        self.nodes[index].node.clone().expect("node not started")
    }

    pub fn running_nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.iter().filter_map(|n| n.node.clone()).collect()
    }

    pub fn shutdown_all(&self) {
        for node in self.running_nodes() {
            node.shutdown();
        }
    }

    /// Build and sign a client transaction.
    pub fn signed_transaction(
        &self,
        contract: &str,
        method: &str,
        arguments: Vec<Argument>,
    ) -> SignedTransaction {
        let transaction = Transaction {
            protocol_version: 1,
            virtual_chain_id: 42,
            contract_name: contract.into(),
            method_name: method.into(),
            arguments,
            timestamp: now_nano(),
            signer_public_key: self.client.public_key(),
        };
        let txhash = calc_tx_hash(&transaction);
        let signature = self.client.sign(&txhash).expect("client signing");
        SignedTransaction { transaction, signature }
    }

    /// Submit to `node_index` and wait for the committed receipt there.
    pub async fn submit_and_await_receipt(
        &self,
        node_index: usize,
        contract: &str,
        method: &str,
        arguments: Vec<Argument>,
    ) -> (Hash, TransactionReceipt) {
        let node = self.node(node_index);
        let signed = self.signed_transaction(contract, method, arguments);
        let txhash = calc_tx_hash(&signed.transaction);
        node.transaction_pool
            .add_new_transaction(signed)
            .await
            .expect("transaction must be admitted");

        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        loop {
            if let Some((receipt, _)) = node.transaction_pool.get_committed_receipt(&txhash).await
            {
                return (txhash, receipt);
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "receipt for {} never committed",
                hex::encode(&txhash[..4])
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait until `node_index` reaches `height`.
    pub async fn await_height(&self, node_index: usize, height: BlockHeight, within: Duration) {
        let node = self.node(node_index);
        let deadline = tokio::time::Instant::now() + within;
        loop {
            if node.block_storage.get_last_block_height().unwrap() >= height {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "node {} never reached height {}",
                node_index,
                height
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Read one u64 state value at the node's current height.
    pub async fn read_state_u64(&self, node_index: usize, contract: &str, key: &[u8]) -> u64 {
        let node = self.node(node_index);
        let (height, _) = node.state_storage.get_last_committed().await;
        let records = node
            .state_storage
            .read_keys(height, contract, &[key.to_vec()])
            .await
            .expect("state read");
        let value = &records[0].value;
        if value.is_empty() {
            return 0;
        }
        u64::from_be_bytes(value.as_slice().try_into().expect("u64 state value"))
    }

    /// State roots of all running nodes at `height`.
    pub async fn state_roots_at(&self, height: BlockHeight) -> Vec<Hash> {
        let mut roots = Vec::new();
        for node in self.running_nodes() {
            roots.push(node.state_storage.get_state_hash(height).await.expect("state hash"));
        }
        roots
    }
}

/// Key of a benchmark-token balance slot.
pub fn balance_key(account: u64) -> Vec<u8> {
    format!("balance_{}", account).into_bytes()
}

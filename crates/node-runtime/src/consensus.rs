//! # Benchmark Consensus
//!
//! A single constant leader drives the chain: it drains the pool into a
//! transactions block (proposing empty blocks when the pool stays
//! quiet), executes it into a results block, signs the pair, commits
//! locally, and broadcasts the committed block. Validators re-derive
//! both halves through the consensus context, check the leader's
//! recoverable signature, and commit.
//!
//! Block sync drives the same validation through
//! `handle_block_consensus(VerifyAndUpdate, ..)`, so a block is never
//! applied — live or during catch-up — without passing it.

use crate::wiring::GossipSender;
use async_trait::async_trait;
use fl_block_storage::{
    BlockConsensusHandler, BlockStorageService, HandleBlockConsensusMode,
    PortError as StoragePortError,
};
use fl_consensus_context::ConsensusContextService;
use shared_crypto::{calc_block_pair_hash, recover_signer_address, NodeKeyPair};
use shared_types::{BlockPair, BlockProof, NodeAddress, ProofSigner};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct BenchmarkConsensusConfig {
    pub node_address: NodeAddress,
    pub leader_address: NodeAddress,
    pub empty_block_time: Duration,
    pub retry_interval: Duration,
}

pub struct BenchmarkConsensus {
    config: BenchmarkConsensusConfig,
    keypair: Arc<NodeKeyPair>,
    context: Arc<ConsensusContextService>,
    storage: Arc<BlockStorageService>,
    gossip: Arc<GossipSender>,
}

impl BenchmarkConsensus {
    pub fn new(
        config: BenchmarkConsensusConfig,
        keypair: Arc<NodeKeyPair>,
        context: Arc<ConsensusContextService>,
        storage: Arc<BlockStorageService>,
        gossip: Arc<GossipSender>,
    ) -> Self {
        Self { config, keypair, context, storage, gossip }
    }

    pub fn is_leader(&self) -> bool {
        self.config.node_address == self.config.leader_address
    }

    /// The leader's proposal loop; runs supervised until shutdown.
    pub async fn run_leader_loop(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }
            match self.propose_and_commit().await {
                Ok(was_empty) => {
                    // Pace empty blocks; full blocks ship back to back.
                    if was_empty {
                        tokio::select! {
                            _ = tokio::time::sleep(self.config.empty_block_time) => {}
                            _ = shutdown.changed() => return,
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "proposal round failed, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.retry_interval) => {}
                        _ = shutdown.changed() => return,
                    }
                }
            }
        }
    }

    async fn propose_and_commit(&self) -> Result<bool, String> {
        let prev = self.storage.get_last_block().map_err(|e| e.to_string())?;

        let tx_block = self
            .context
            .request_new_transactions_block(prev.as_ref().map(|p| &p.transactions_block))
            .await
            .map_err(|e| e.to_string())?;
        let was_empty = tx_block.signed_transactions.is_empty();

        let results_block = self
            .context
            .request_new_results_block(&tx_block, prev.as_ref().map(|p| &p.results_block))
            .await
            .map_err(|e| e.to_string())?;

        let mut block = BlockPair { transactions_block: tx_block, results_block };
        self.attach_proof(&mut block)?;

        self.storage.commit_block(&block).await.map_err(|e| e.to_string())?;
        info!(height = block.height(), empty = was_empty, "leader committed block");

        if let Err(e) = self.gossip.broadcast_block_committed(block).await {
            // Followers recover through block sync.
            warn!(error = %e, "committed block broadcast failed");
        }
        Ok(was_empty)
    }

    fn attach_proof(&self, block: &mut BlockPair) -> Result<(), String> {
        let block_hash = calc_block_pair_hash(block);
        let signature = self.keypair.sign(&block_hash).map_err(|e| e.to_string())?;
        let proof = BlockProof {
            signers: vec![ProofSigner {
                node_address: self.config.node_address,
                signature,
            }],
        };
        block.transactions_block.proof = proof.clone();
        block.results_block.proof = proof;
        Ok(())
    }

    /// A committed block announced by the leader.
    pub async fn handle_committed_block_broadcast(&self, sender: NodeAddress, block: BlockPair) {
        if self.is_leader() {
            return; // we produced it
        }
        if sender != self.config.leader_address {
            debug!(%sender, "committed-block broadcast from non-leader dropped");
            return;
        }

        let height = block.height();
        let current = match self.storage.get_last_block_height() {
            Ok(height) => height,
            Err(e) => {
                warn!(error = %e, "cannot read chain height");
                return;
            }
        };
        if height <= current {
            return; // stale announcement
        }
        if height > current + 1 {
            // We are behind by more than one block; block sync closes
            // the gap.
            debug!(height, current, "committed block beyond next height, leaving it to sync");
            return;
        }

        let prev = self.storage.get_last_block().ok().flatten();
        if let Err(e) = self.verify_block(&block, prev.as_ref()).await {
            warn!(height, error = %e, "broadcast block failed validation");
            return;
        }
        if let Err(e) = self.storage.commit_block(&block).await {
            warn!(height, error = %e, "broadcast block failed to commit");
        }
    }

    /// Full validation of a block against its predecessor: leader proof
    /// plus re-derivation of both halves.
    async fn verify_block(
        &self,
        block: &BlockPair,
        prev: Option<&BlockPair>,
    ) -> Result<(), String> {
        let block_hash = calc_block_pair_hash(block);
        let signer = block
            .transactions_block
            .proof
            .signers
            .first()
            .ok_or_else(|| "block proof carries no signers".to_string())?;
        if signer.node_address != self.config.leader_address {
            return Err(format!("proof signer {} is not the leader", signer.node_address));
        }
        let recovered = recover_signer_address(&block_hash, &signer.signature)
            .map_err(|e| e.to_string())?;
        if recovered != signer.node_address {
            return Err("proof signature does not recover to its address".into());
        }

        self.context
            .validate_transactions_block(
                &block.transactions_block,
                prev.map(|p| &p.transactions_block),
            )
            .await
            .map_err(|e| e.to_string())?;
        self.context
            .validate_results_block(
                &block.results_block,
                &block.transactions_block,
                prev.map(|p| &p.results_block),
            )
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

#[async_trait]
impl BlockConsensusHandler for BenchmarkConsensus {
    async fn handle_block_consensus(
        &self,
        mode: HandleBlockConsensusMode,
        block: Option<&BlockPair>,
        prev_block: Option<&BlockPair>,
    ) -> Result<(), StoragePortError> {
        match mode {
            HandleBlockConsensusMode::UpdateOnly => {
                let height = block.map(|b| b.height()).unwrap_or(0);
                debug!(height, "consensus position updated");
                Ok(())
            }
            HandleBlockConsensusMode::VerifyAndUpdate => {
                let block =
                    block.ok_or_else(|| StoragePortError("verify without a block".into()))?;
                self.verify_block(block, prev_block).await.map_err(StoragePortError)
            }
        }
    }
}

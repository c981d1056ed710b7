//! # Consensus Context Service
//!
//! Builds block proposals out of the pool and the virtual machine, and
//! re-derives them to validate proposals received from others. The
//! elected validator set comes from the elections system contract at
//! the previous height, falling back to the genesis federation while
//! elections are not active.

use crate::committee::choose_committee;
use crate::errors::ConsensusContextError;
use crate::ports::{StateRootReader, TransactionBatchSource, VmExecutor};
use shared_crypto::{calc_results_block_hash, calc_transactions_block_hash};
use shared_types::{
    primitives::now_nano, Argument, BlockHeight, BlockProof, NodeAddress, ProtocolVersion,
    ResultsBlock, ResultsBlockHeader, TransactionsBlock, TransactionsBlockHeader, VirtualChainId,
    NODE_ADDRESS_SIZE,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Name of the elections system contract and its query method.
pub const ELECTIONS_CONTRACT_NAME: &str = "_Elections";
pub const ELECTIONS_METHOD_GET_ELECTED: &str = "getElectedValidators";

#[derive(Clone, Debug)]
pub struct ConsensusContextConfig {
    pub protocol_version: ProtocolVersion,
    pub virtual_chain_id: VirtualChainId,
    pub max_transactions_per_block: u32,
    pub genesis_federation: Vec<NodeAddress>,
}

pub struct ConsensusContextService {
    config: ConsensusContextConfig,
    pool: Arc<dyn TransactionBatchSource>,
    vm: Arc<dyn VmExecutor>,
    state: Arc<dyn StateRootReader>,
}

impl ConsensusContextService {
    pub fn new(
        config: ConsensusContextConfig,
        pool: Arc<dyn TransactionBatchSource>,
        vm: Arc<dyn VmExecutor>,
        state: Arc<dyn StateRootReader>,
    ) -> Self {
        Self { config, pool, vm, state }
    }

    /// Committee that orders transactions for `height`.
    pub async fn request_ordering_committee(
        &self,
        height: BlockHeight,
        seed: u64,
        max_size: u32,
    ) -> Result<Vec<NodeAddress>, ConsensusContextError> {
        let elected = self.get_elected_validators(height).await?;
        let committee = choose_committee(&elected, seed, max_size);
        debug!(height, seed, members = committee.len(), "ordering committee chosen");
        Ok(committee)
    }

    /// Committee that validates the proposal for `height`. Same
    /// derivation as ordering; kept separate so engines can diverge the
    /// two without touching callers.
    pub async fn request_validation_committee(
        &self,
        height: BlockHeight,
        seed: u64,
        max_size: u32,
    ) -> Result<Vec<NodeAddress>, ConsensusContextError> {
        self.request_ordering_committee(height, seed, max_size).await
    }

    /// Drain the pool into a new transactions block on top of `prev`.
    pub async fn request_new_transactions_block(
        &self,
        prev: Option<&TransactionsBlock>,
    ) -> Result<TransactionsBlock, ConsensusContextError> {
        let height = prev.map(|b| b.header.block_height).unwrap_or(0) + 1;
        let prev_block_hash =
            prev.map(|b| calc_transactions_block_hash(&b.header)).unwrap_or([0; 32]);
        // Block time never regresses, even against a skewed clock.
        let timestamp = now_nano().max(prev.map(|b| b.header.timestamp).unwrap_or(0));

        let transactions = self
            .pool
            .get_transactions_for_ordering(self.config.max_transactions_per_block)
            .await;
        info!(height, transactions = transactions.len(), "transactions block built");

        Ok(TransactionsBlock {
            header: TransactionsBlockHeader {
                protocol_version: self.config.protocol_version,
                virtual_chain_id: self.config.virtual_chain_id,
                block_height: height,
                prev_block_hash,
                timestamp,
                num_signed_transactions: transactions.len() as u32,
            },
            metadata: vec![],
            signed_transactions: transactions,
            proof: BlockProof::default(),
        })
    }

    /// Execute `tx_block` and wrap the outcome in a results block.
    /// Nothing is committed; the post-execution root is a projection.
    pub async fn request_new_results_block(
        &self,
        tx_block: &TransactionsBlock,
        prev_results: Option<&ResultsBlock>,
    ) -> Result<ResultsBlock, ConsensusContextError> {
        let height = tx_block.header.block_height;
        let pre_execution_state_root = self
            .state
            .get_state_hash(height - 1)
            .await
            .map_err(|e| ConsensusContextError::Dependency(e.to_string()))?;

        let processed = self
            .vm
            .process_transaction_set(height, &tx_block.signed_transactions)
            .await
            .map_err(|e| ConsensusContextError::Dependency(e.to_string()))?;

        let post_execution_state_root = self
            .state
            .project_root(height - 1, &processed.contract_state_diffs)
            .await
            .map_err(|e| ConsensusContextError::Dependency(e.to_string()))?;

        let prev_block_hash =
            prev_results.map(|b| calc_results_block_hash(&b.header)).unwrap_or([0; 32]);

        Ok(ResultsBlock {
            header: ResultsBlockHeader {
                protocol_version: self.config.protocol_version,
                virtual_chain_id: self.config.virtual_chain_id,
                block_height: height,
                prev_block_hash,
                timestamp: tx_block.header.timestamp,
                pre_execution_state_root,
                post_execution_state_root,
                num_transaction_receipts: processed.transaction_receipts.len() as u32,
            },
            transaction_receipts: processed.transaction_receipts,
            contract_state_diffs: processed.contract_state_diffs,
            proof: BlockProof::default(),
        })
    }

    /// Structural validation of a proposed transactions block.
    pub async fn validate_transactions_block(
        &self,
        block: &TransactionsBlock,
        prev: Option<&TransactionsBlock>,
    ) -> Result<(), ConsensusContextError> {
        let header = &block.header;
        if header.protocol_version != self.config.protocol_version {
            return Err(fail("protocol version mismatch"));
        }
        if header.virtual_chain_id != self.config.virtual_chain_id {
            return Err(fail("virtual chain mismatch"));
        }
        let expected_height = prev.map(|b| b.header.block_height).unwrap_or(0) + 1;
        if header.block_height != expected_height {
            return Err(fail(&format!(
                "height {} does not follow {}",
                header.block_height,
                expected_height - 1
            )));
        }
        let expected_prev_hash =
            prev.map(|b| calc_transactions_block_hash(&b.header)).unwrap_or([0; 32]);
        if header.prev_block_hash != expected_prev_hash {
            return Err(fail("previous transactions block hash mismatch"));
        }
        if let Some(prev) = prev {
            if header.timestamp < prev.header.timestamp {
                return Err(fail("block timestamp regressed"));
            }
        }
        if header.num_signed_transactions as usize != block.signed_transactions.len() {
            return Err(fail("transaction count disagrees with header"));
        }
        Ok(())
    }

    /// Redo the execution of `tx_block` and compare every derived field
    /// of the proposed results block.
    pub async fn validate_results_block(
        &self,
        block: &ResultsBlock,
        tx_block: &TransactionsBlock,
        prev_results: Option<&ResultsBlock>,
    ) -> Result<(), ConsensusContextError> {
        let derived = self.request_new_results_block(tx_block, prev_results).await?;

        if block.header != derived.header {
            return Err(fail("results block header disagrees with re-execution"));
        }
        if block.transaction_receipts != derived.transaction_receipts {
            return Err(fail("transaction receipts disagree with re-execution"));
        }
        if block.contract_state_diffs != derived.contract_state_diffs {
            return Err(fail("contract state diffs disagree with re-execution"));
        }
        Ok(())
    }

    /// The elected validator set for deciding `current_block_height`,
    /// derived at `current_block_height - 1`.
    pub async fn get_elected_validators(
        &self,
        current_block_height: BlockHeight,
    ) -> Result<Vec<NodeAddress>, ConsensusContextError> {
        let last_committed = current_block_height.saturating_sub(1);
        if last_committed == 0 {
            return Ok(self.config.genesis_federation.clone());
        }

        let output = self
            .vm
            .call_system_contract(
                last_committed,
                ELECTIONS_CONTRACT_NAME,
                ELECTIONS_METHOD_GET_ELECTED,
            )
            .await
            .map_err(|e| ConsensusContextError::Dependency(e.to_string()))?;

        let packed = match output.first() {
            Some(Argument::Bytes(bytes)) => bytes,
            Some(_) => {
                return Err(ConsensusContextError::ElectionsOutputCorrupt(
                    "first output argument is not bytes".into(),
                ))
            }
            None => {
                return Err(ConsensusContextError::ElectionsOutputCorrupt(
                    "empty output argument list".into(),
                ))
            }
        };

        // Elections not active yet: fall back to genesis.
        if packed.is_empty() {
            return Ok(self.config.genesis_federation.clone());
        }
        if packed.len() % NODE_ADDRESS_SIZE != 0 {
            return Err(ConsensusContextError::ElectionsOutputCorrupt(format!(
                "packed length {} not a multiple of {}",
                packed.len(),
                NODE_ADDRESS_SIZE
            )));
        }

        let elected = packed
            .chunks(NODE_ADDRESS_SIZE)
            .filter_map(NodeAddress::try_from_slice)
            .collect::<Vec<_>>();
        debug!(height = last_committed, elected = elected.len(), "elected validators queried");
        Ok(elected)
    }
}

fn fail(reason: &str) -> ConsensusContextError {
    ConsensusContextError::ValidationFailed(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{PortError, ProcessedTransactionSet};
    use async_trait::async_trait;
    use shared_types::{
        ContractStateDiff, ExecutionResult, Hash, SignedTransaction, StateRecord, Transaction,
        TransactionReceipt,
    };
    use std::sync::Mutex;

    struct StubPool {
        batch: Mutex<Vec<SignedTransaction>>,
    }

    #[async_trait]
    impl TransactionBatchSource for StubPool {
        async fn get_transactions_for_ordering(&self, max_count: u32) -> Vec<SignedTransaction> {
            let mut batch = self.batch.lock().unwrap();
            let take = std::cmp::min(max_count as usize, batch.len());
            batch.drain(..take).collect()
        }
    }

    struct StubVm {
        elections_output: Vec<Argument>,
    }

    #[async_trait]
    impl VmExecutor for StubVm {
        async fn process_transaction_set(
            &self,
            _block_height: BlockHeight,
            transactions: &[SignedTransaction],
        ) -> Result<ProcessedTransactionSet, PortError> {
            // Deterministic toy execution: one receipt per transaction,
            // one write per transaction.
            let transaction_receipts = transactions
                .iter()
                .map(|t| TransactionReceipt {
                    txhash: shared_crypto::calc_tx_hash(&t.transaction),
                    execution_result: ExecutionResult::Success,
                    output: vec![],
                })
                .collect();
            let contract_state_diffs = vec![ContractStateDiff {
                contract_name: "c".into(),
                records: transactions
                    .iter()
                    .enumerate()
                    .map(|(i, _)| StateRecord::new(vec![i as u8], *b"x"))
                    .collect(),
            }];
            Ok(ProcessedTransactionSet { transaction_receipts, contract_state_diffs })
        }

        async fn call_system_contract(
            &self,
            _block_height: BlockHeight,
            _contract_name: &str,
            _method_name: &str,
        ) -> Result<Vec<Argument>, PortError> {
            Ok(self.elections_output.clone())
        }
    }

    struct StubState;

    #[async_trait]
    impl StateRootReader for StubState {
        async fn get_state_hash(&self, height: BlockHeight) -> Result<Hash, PortError> {
            Ok([height as u8; 32])
        }

        async fn project_root(
            &self,
            base_height: BlockHeight,
            diffs: &[ContractStateDiff],
        ) -> Result<Hash, PortError> {
            // Distinct deterministic digest of base and diff count.
            let mut root = [0u8; 32];
            root[0] = base_height as u8;
            root[1] = diffs.iter().map(|d| d.records.len()).sum::<usize>() as u8;
            Ok(root)
        }
    }

    fn addr(n: u8) -> NodeAddress {
        NodeAddress::from_bytes([n; 20])
    }

    fn config() -> ConsensusContextConfig {
        ConsensusContextConfig {
            protocol_version: 1,
            virtual_chain_id: 42,
            max_transactions_per_block: 100,
            genesis_federation: vec![addr(1), addr(2), addr(3), addr(4)],
        }
    }

    fn service_with(elections_output: Vec<Argument>) -> ConsensusContextService {
        ConsensusContextService::new(
            config(),
            Arc::new(StubPool { batch: Mutex::new(vec![]) }),
            Arc::new(StubVm { elections_output }),
            Arc::new(StubState),
        )
    }

    fn signed(tag: u8) -> SignedTransaction {
        SignedTransaction {
            transaction: Transaction {
                protocol_version: 1,
                virtual_chain_id: 42,
                contract_name: "c".into(),
                method_name: "m".into(),
                arguments: vec![],
                timestamp: 1,
                signer_public_key: vec![tag],
            },
            signature: vec![],
        }
    }

    #[tokio::test]
    async fn test_genesis_fallback_at_height_one() {
        let service = service_with(vec![Argument::Bytes(vec![])]);
        let elected = service.get_elected_validators(1).await.unwrap();
        assert_eq!(elected, config().genesis_federation);
    }

    #[tokio::test]
    async fn test_empty_elections_falls_back_to_genesis() {
        let service = service_with(vec![Argument::Bytes(vec![])]);
        let elected = service.get_elected_validators(5).await.unwrap();
        assert_eq!(elected, config().genesis_federation);
    }

    #[tokio::test]
    async fn test_packed_addresses_parsed_twenty_bytes_apiece() {
        let mut packed = vec![];
        packed.extend_from_slice(&[7u8; 20]);
        packed.extend_from_slice(&[9u8; 20]);
        let service = service_with(vec![Argument::Bytes(packed)]);
        let elected = service.get_elected_validators(5).await.unwrap();
        assert_eq!(elected, vec![addr(7), addr(9)]);
    }

    #[tokio::test]
    async fn test_corrupt_elections_output_is_an_error() {
        let service = service_with(vec![Argument::Bytes(vec![1, 2, 3])]);
        assert!(matches!(
            service.get_elected_validators(5).await,
            Err(ConsensusContextError::ElectionsOutputCorrupt(_))
        ));
        let service = service_with(vec![Argument::Uint64(5)]);
        assert!(matches!(
            service.get_elected_validators(5).await,
            Err(ConsensusContextError::ElectionsOutputCorrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_committees_are_deterministic_across_instances() {
        let a = service_with(vec![Argument::Bytes(vec![])]);
        let b = service_with(vec![Argument::Bytes(vec![])]);
        let ca = a.request_ordering_committee(3, 77, 3).await.unwrap();
        let cb = b.request_ordering_committee(3, 77, 3).await.unwrap();
        assert_eq!(ca, cb);
        assert_eq!(ca.len(), 3);
    }

    #[tokio::test]
    async fn test_proposal_roundtrip_validates() {
        let service = service_with(vec![Argument::Bytes(vec![])]);
        let tx_block = service.request_new_transactions_block(None).await.unwrap();
        let results = service.request_new_results_block(&tx_block, None).await.unwrap();

        service.validate_transactions_block(&tx_block, None).await.unwrap();
        service.validate_results_block(&results, &tx_block, None).await.unwrap();

        assert_eq!(tx_block.header.block_height, 1);
        assert_eq!(results.header.pre_execution_state_root, [0u8; 32]);
    }

    #[tokio::test]
    async fn test_tampered_results_fail_validation() {
        let service = service_with(vec![Argument::Bytes(vec![])]);
        let pool = StubPool { batch: Mutex::new(vec![signed(1), signed(2)]) };
        let service_with_txs = ConsensusContextService::new(
            config(),
            Arc::new(pool),
            Arc::new(StubVm { elections_output: vec![Argument::Bytes(vec![])] }),
            Arc::new(StubState),
        );

        let tx_block = service_with_txs.request_new_transactions_block(None).await.unwrap();
        assert_eq!(tx_block.signed_transactions.len(), 2);
        let mut results =
            service_with_txs.request_new_results_block(&tx_block, None).await.unwrap();
        results.header.post_execution_state_root = [0xEE; 32];

        assert!(matches!(
            service.validate_results_block(&results, &tx_block, None).await,
            Err(ConsensusContextError::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_height_fails_transactions_validation() {
        let service = service_with(vec![Argument::Bytes(vec![])]);
        let mut tx_block = service.request_new_transactions_block(None).await.unwrap();
        tx_block.header.block_height = 9;
        assert!(matches!(
            service.validate_transactions_block(&tx_block, None).await,
            Err(ConsensusContextError::ValidationFailed(_))
        ));
    }
}

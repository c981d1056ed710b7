//! # Transaction Pool Service
//!
//! The admission pipeline and the pool API consensus consumes.
//!
//! Admission order: static validation (versions, fields, signature) →
//! timestamp window → deduplication against both pools → byte budget →
//! virtual-machine pre-order check → insert and forward. Forwarded
//! transactions from peers run the same pipeline minus the forwarding.

use crate::domain::committed::CommittedPool;
use crate::domain::pending::PendingPool;
use crate::errors::{TransactionPoolError, TransactionStatusReply};
use crate::ports::{PreOrderChecker, TransactionForwarder};
use shared_crypto::{calc_node_address_from_public_key, calc_tx_hash, recover_signer_address};
use shared_types::{
    primitives::now_nano, BlockHeight, Hash, ProtocolVersion, SignedTransaction, TimestampNano,
    TransactionReceipt, TransactionStatus, VirtualChainId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct TransactionPoolConfig {
    pub protocol_version: ProtocolVersion,
    pub virtual_chain_id: VirtualChainId,
    pub pending_pool_size_bytes: u64,
    pub committed_pool_retention: Duration,
    pub tx_timestamp_past_window: Duration,
    pub tx_timestamp_future_window: Duration,
    pub transaction_ordering_wait: Duration,
}

struct PoolsInner {
    pending: PendingPool,
    committed: CommittedPool,
    last_committed_height: BlockHeight,
    last_committed_timestamp: TimestampNano,
}

pub struct TransactionPoolService {
    config: TransactionPoolConfig,
    inner: RwLock<PoolsInner>,
    vm: Arc<dyn PreOrderChecker>,
    forwarder: Arc<dyn TransactionForwarder>,
    pending_added: Notify,
}

impl TransactionPoolService {
    pub fn new(
        config: TransactionPoolConfig,
        vm: Arc<dyn PreOrderChecker>,
        forwarder: Arc<dyn TransactionForwarder>,
    ) -> Self {
        let inner = PoolsInner {
            pending: PendingPool::new(config.pending_pool_size_bytes),
            committed: CommittedPool::new(config.committed_pool_retention),
            last_committed_height: 0,
            last_committed_timestamp: 0,
        };
        Self { config, inner: RwLock::new(inner), vm, forwarder, pending_added: Notify::new() }
    }

    /// Admit a client transaction and forward it to peers.
    pub async fn add_new_transaction(
        &self,
        transaction: SignedTransaction,
    ) -> Result<TransactionStatusReply, TransactionPoolError> {
        let reply = self.admit(transaction.clone(), true).await?;
        // Forwarding failures must not fail an already-admitted
        // transaction; peers catch up through block sync regardless.
        if let Err(e) = self.forwarder.forward_transactions(vec![transaction]).await {
            warn!(error = %e, "transaction forwarding failed");
        }
        Ok(reply)
    }

    /// Admit transactions relayed by a peer; never re-forwarded.
    pub async fn handle_forwarded_transactions(&self, transactions: Vec<SignedTransaction>) {
        for transaction in transactions {
            if let Err(e) = self.admit(transaction, false).await {
                debug!(error = %e, "forwarded transaction not admitted");
            }
        }
    }

    async fn admit(
        &self,
        transaction: SignedTransaction,
        is_local: bool,
    ) -> Result<TransactionStatusReply, TransactionPoolError> {
        let txhash = calc_tx_hash(&transaction.transaction);
        let now = now_nano();

        if let Some(status) = self.static_validation(&transaction, txhash, now) {
            return Err(self.reject(txhash, status).await);
        }

        // Admission bookkeeping under one lock acquisition.
        {
            let inner = self.inner.read().await;
            if inner.committed.has(&txhash) {
                drop(inner);
                return Err(
                    self.reject(txhash, TransactionStatus::DuplicateTransactionAlreadyCommitted)
                        .await,
                );
            }
            if inner.pending.has(&txhash) {
                drop(inner);
                return Err(
                    self.reject(txhash, TransactionStatus::DuplicateTransactionAlreadyPending)
                        .await,
                );
            }
        }

        let size_bytes = bincode::serialized_size(&transaction)
            .map_err(|e| TransactionPoolError::Dependency(e.to_string()))?;
        {
            let inner = self.inner.read().await;
            if !inner.pending.has_room_for(size_bytes) {
                drop(inner);
                return Err(self.reject(txhash, TransactionStatus::RejectedCongestion).await);
            }
        }

        if self.vm.check_transaction(&transaction).await.is_err() {
            return Err(
                self.reject(txhash, TransactionStatus::RejectedSmartContractPreOrder).await
            );
        }

        let reply = {
            let mut inner = self.inner.write().await;
            // Re-check duplicates: the VM call ran outside the lock.
            if inner.committed.has(&txhash) || inner.pending.has(&txhash) {
                drop(inner);
                return Err(
                    self.reject(txhash, TransactionStatus::DuplicateTransactionAlreadyPending)
                        .await,
                );
            }
            inner.pending.add(txhash, transaction, size_bytes);
            TransactionStatusReply {
                txhash,
                status: TransactionStatus::Pending,
                block_height: inner.last_committed_height,
                block_timestamp: inner.last_committed_timestamp,
            }
        };
        self.pending_added.notify_one();
        debug!(txhash = %hex_prefix(&txhash), local = is_local, "transaction admitted");
        Ok(reply)
    }

    fn static_validation(
        &self,
        transaction: &SignedTransaction,
        txhash: Hash,
        now: TimestampNano,
    ) -> Option<TransactionStatus> {
        let tx = &transaction.transaction;
        if tx.protocol_version != self.config.protocol_version {
            return Some(TransactionStatus::RejectedUnsupportedVersion);
        }
        if tx.virtual_chain_id != self.config.virtual_chain_id {
            return Some(TransactionStatus::RejectedVirtualChainMismatch);
        }
        if tx.contract_name.is_empty() || tx.method_name.is_empty() {
            return Some(TransactionStatus::RejectedMalformedTransaction);
        }

        // The signature must recover to the address the signer claims.
        let claimed = match calc_node_address_from_public_key(&tx.signer_public_key) {
            Ok(address) => address,
            Err(_) => return Some(TransactionStatus::RejectedSignatureMismatch),
        };
        match recover_signer_address(&txhash, &transaction.signature) {
            Ok(recovered) if recovered == claimed => {}
            _ => return Some(TransactionStatus::RejectedSignatureMismatch),
        }

        let past = self.config.tx_timestamp_past_window.as_nanos() as TimestampNano;
        let future = self.config.tx_timestamp_future_window.as_nanos() as TimestampNano;
        if tx.timestamp + past < now || tx.timestamp > now + future {
            return Some(TransactionStatus::RejectedTimestampWindowExceeded);
        }
        None
    }

    async fn reject(&self, txhash: Hash, status: TransactionStatus) -> TransactionPoolError {
        let inner = self.inner.read().await;
        info!(txhash = %hex_prefix(&txhash), ?status, "transaction rejected");
        TransactionPoolError::Rejected(TransactionStatusReply {
            txhash,
            status,
            block_height: inner.last_committed_height,
            block_timestamp: inner.last_committed_timestamp,
        })
    }

    /// FIFO batch for consensus: none expired, none committed. Waits up
    /// to `transaction_ordering_wait` for the first pending transaction,
    /// then returns what is there — possibly nothing.
    pub async fn get_transactions_for_ordering(&self, max_count: u32) -> Vec<SignedTransaction> {
        let deadline = tokio::time::Instant::now() + self.config.transaction_ordering_wait;
        loop {
            {
                let mut inner = self.inner.write().await;
                let min_timestamp = now_nano()
                    .saturating_sub(self.config.tx_timestamp_past_window.as_nanos() as u64);
                let batch = inner.pending.get_batch(max_count, min_timestamp);
                if !batch.is_empty() {
                    return batch;
                }
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Vec::new();
            }
            let _ = tokio::time::timeout(deadline - now, self.pending_added.notified()).await;
        }
    }

    /// Move committed transactions from pending to committed memory.
    ///
    /// Idempotent: any height other than `last + 1` is a no-op that
    /// returns the next desired height.
    pub async fn commit_transaction_receipts(
        &self,
        block_height: BlockHeight,
        block_timestamp: TimestampNano,
        receipts: &[TransactionReceipt],
    ) -> BlockHeight {
        let mut inner = self.inner.write().await;
        if block_height != inner.last_committed_height + 1 {
            return inner.last_committed_height + 1;
        }

        let now = now_nano();
        for receipt in receipts {
            inner.pending.remove(&receipt.txhash);
            inner.committed.add(receipt.clone(), block_height, block_timestamp, now);
        }
        inner.last_committed_height = block_height;
        inner.last_committed_timestamp = block_timestamp;
        inner.committed.prune(now);

        debug!(height = block_height, receipts = receipts.len(), "receipts committed to pool");
        block_height + 1
    }

    /// Receipt of a recently committed transaction, if retained.
    pub async fn get_committed_receipt(
        &self,
        txhash: &Hash,
    ) -> Option<(TransactionReceipt, BlockHeight)> {
        let inner = self.inner.read().await;
        inner.committed.get(txhash).map(|entry| (entry.receipt.clone(), entry.block_height))
    }

    /// Pending-pool size, for tests and introspection.
    pub async fn pending_count(&self) -> usize {
        self.inner.read().await.pending.len()
    }

    pub async fn last_committed_height(&self) -> BlockHeight {
        self.inner.read().await.last_committed_height
    }
}

fn hex_prefix(hash: &Hash) -> String {
    hash[..4].iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PortError;
    use async_trait::async_trait;
    use shared_crypto::NodeKeyPair;
    use shared_types::{Argument, ExecutionResult, Transaction};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct TestVm {
        reject: AtomicBool,
    }

    #[async_trait]
    impl PreOrderChecker for TestVm {
        async fn check_transaction(&self, _: &SignedTransaction) -> Result<(), PortError> {
            if self.reject.load(Ordering::Relaxed) {
                Err(PortError("contract said no".into()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct RecordingForwarder {
        forwarded: Mutex<Vec<SignedTransaction>>,
    }

    #[async_trait]
    impl TransactionForwarder for RecordingForwarder {
        async fn forward_transactions(
            &self,
            transactions: Vec<SignedTransaction>,
        ) -> Result<(), PortError> {
            self.forwarded.lock().unwrap().extend(transactions);
            Ok(())
        }
    }

    fn test_config() -> TransactionPoolConfig {
        TransactionPoolConfig {
            protocol_version: 1,
            virtual_chain_id: 42,
            pending_pool_size_bytes: 1 << 20,
            committed_pool_retention: Duration::from_secs(600),
            tx_timestamp_past_window: Duration::from_secs(300),
            tx_timestamp_future_window: Duration::from_secs(120),
            transaction_ordering_wait: Duration::from_millis(30),
        }
    }

    struct Harness {
        service: TransactionPoolService,
        vm: Arc<TestVm>,
        forwarder: Arc<RecordingForwarder>,
        keypair: NodeKeyPair,
    }

    fn new_harness() -> Harness {
        let vm = Arc::new(TestVm { reject: AtomicBool::new(false) });
        let forwarder = Arc::new(RecordingForwarder::default());
        Harness {
            service: TransactionPoolService::new(test_config(), vm.clone(), forwarder.clone()),
            vm,
            forwarder,
            keypair: NodeKeyPair::generate(),
        }
    }

    fn signed_tx(keypair: &NodeKeyPair, timestamp: TimestampNano, tag: u64) -> SignedTransaction {
        let transaction = Transaction {
            protocol_version: 1,
            virtual_chain_id: 42,
            contract_name: "BenchmarkToken".into(),
            method_name: "transfer".into(),
            arguments: vec![Argument::Uint64(tag)],
            timestamp,
            signer_public_key: keypair.public_key(),
        };
        let txhash = calc_tx_hash(&transaction);
        let signature = keypair.sign(&txhash).unwrap();
        SignedTransaction { transaction, signature }
    }

    #[tokio::test]
    async fn test_admission_and_forwarding() {
        let h = new_harness();
        let tx = signed_tx(&h.keypair, now_nano(), 1);

        let reply = h.service.add_new_transaction(tx).await.unwrap();
        assert_eq!(reply.status, TransactionStatus::Pending);
        assert_eq!(h.service.pending_count().await, 1);
        assert_eq!(h.forwarder.forwarded.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_admission_is_idempotent() {
        let h = new_harness();
        let tx = signed_tx(&h.keypair, now_nano(), 1);

        h.service.add_new_transaction(tx.clone()).await.unwrap();
        let err = h.service.add_new_transaction(tx).await.unwrap_err();
        assert_eq!(err.status(), Some(TransactionStatus::DuplicateTransactionAlreadyPending));
        assert_eq!(h.service.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_static_rejections() {
        let h = new_harness();
        let now = now_nano();

        let mut wrong_version = signed_tx(&h.keypair, now, 1);
        wrong_version.transaction.protocol_version = 9;
        let err = h.service.add_new_transaction(wrong_version).await.unwrap_err();
        assert_eq!(err.status(), Some(TransactionStatus::RejectedUnsupportedVersion));

        let mut wrong_chain = signed_tx(&h.keypair, now, 2);
        wrong_chain.transaction.virtual_chain_id = 7;
        let err = h.service.add_new_transaction(wrong_chain).await.unwrap_err();
        assert_eq!(err.status(), Some(TransactionStatus::RejectedVirtualChainMismatch));

        // Tampered arguments invalidate the signature.
        let mut tampered = signed_tx(&h.keypair, now, 3);
        tampered.transaction.arguments = vec![Argument::Uint64(999)];
        let err = h.service.add_new_transaction(tampered).await.unwrap_err();
        assert_eq!(err.status(), Some(TransactionStatus::RejectedSignatureMismatch));

        let stale = signed_tx(&h.keypair, now.saturating_sub(3_600_000_000_000), 4);
        let err = h.service.add_new_transaction(stale).await.unwrap_err();
        assert_eq!(err.status(), Some(TransactionStatus::RejectedTimestampWindowExceeded));
    }

    #[tokio::test]
    async fn test_preorder_rejection() {
        let h = new_harness();
        h.vm.reject.store(true, Ordering::Relaxed);
        let err =
            h.service.add_new_transaction(signed_tx(&h.keypair, now_nano(), 1)).await.unwrap_err();
        assert_eq!(err.status(), Some(TransactionStatus::RejectedSmartContractPreOrder));
        assert_eq!(h.service.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_ordering_returns_fifo_batch() {
        let h = new_harness();
        for tag in 1..=3 {
            h.service.add_new_transaction(signed_tx(&h.keypair, now_nano(), tag)).await.unwrap();
        }
        let batch = h.service.get_transactions_for_ordering(2).await;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].transaction.arguments, vec![Argument::Uint64(1)]);
        assert_eq!(batch[1].transaction.arguments, vec![Argument::Uint64(2)]);
    }

    #[tokio::test]
    async fn test_ordering_waits_then_returns_empty() {
        let h = new_harness();
        let start = tokio::time::Instant::now();
        let batch = h.service.get_transactions_for_ordering(10).await;
        assert!(batch.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[tokio::test]
    async fn test_commit_moves_pending_to_committed() {
        let h = new_harness();
        let tx = signed_tx(&h.keypair, now_nano(), 1);
        let txhash = calc_tx_hash(&tx.transaction);
        h.service.add_new_transaction(tx.clone()).await.unwrap();

        let receipt = TransactionReceipt {
            txhash,
            execution_result: ExecutionResult::Success,
            output: vec![],
        };
        let next = h.service.commit_transaction_receipts(1, 1_000, &[receipt]).await;
        assert_eq!(next, 2);
        assert_eq!(h.service.pending_count().await, 0);
        assert!(h.service.get_committed_receipt(&txhash).await.is_some());

        // Resubmission is now caught by committed memory.
        let err = h.service.add_new_transaction(tx).await.unwrap_err();
        assert_eq!(err.status(), Some(TransactionStatus::DuplicateTransactionAlreadyCommitted));
    }

    #[tokio::test]
    async fn test_commit_is_idempotent_on_height() {
        let h = new_harness();
        assert_eq!(h.service.commit_transaction_receipts(5, 1_000, &[]).await, 1);
        assert_eq!(h.service.commit_transaction_receipts(1, 1_000, &[]).await, 2);
        assert_eq!(h.service.commit_transaction_receipts(1, 1_000, &[]).await, 2);
        assert_eq!(h.service.last_committed_height().await, 1);
    }

    #[tokio::test]
    async fn test_forwarded_transactions_not_reforwarded() {
        let h = new_harness();
        let tx = signed_tx(&h.keypair, now_nano(), 1);
        h.service.handle_forwarded_transactions(vec![tx]).await;
        assert_eq!(h.service.pending_count().await, 1);
        assert!(h.forwarder.forwarded.lock().unwrap().is_empty());
    }
}

//! # Native Processor
//!
//! The in-process virtual machine behind the VM ports: a small
//! repository of native contracts executed against state storage, with
//! per-block write overlays so later transactions in a block observe
//! earlier ones.
//!
//! Contracts:
//!
//! | Contract | Methods |
//! |----------|---------|
//! | `BenchmarkToken` | `init(balance, account)`, `transfer(amount, from, to)`, `getBalance(account)` |
//! | `Counter` | `init(start)`, `add(n)`, `get()` |
//! | `_Elections` | `getElectedValidators()` (packed 20-byte addresses, empty while inactive) |
//!
//! Pre-order admission approves any transaction naming a known
//! contract; unknown contracts are rejected before ordering.

use async_trait::async_trait;
use fl_consensus_context::ports::{
    PortError as CtxPortError, ProcessedTransactionSet, VmExecutor,
};
use fl_state_storage::StateStorageService;
use fl_transaction_pool::ports::{PortError as PoolPortError, PreOrderChecker};
use shared_crypto::calc_tx_hash;
use shared_types::{
    Argument, BlockHeight, ContractStateDiff, ExecutionResult, SignedTransaction, StateRecord,
    TransactionReceipt,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const CONTRACT_BENCHMARK_TOKEN: &str = "BenchmarkToken";
const CONTRACT_COUNTER: &str = "Counter";
const CONTRACT_ELECTIONS: &str = "_Elections";

const ELECTED_VALIDATORS_KEY: &[u8] = b"elected_validators";

pub struct NativeProcessor {
    state: Arc<StateStorageService>,
}

/// Write overlay for one block's execution: later transactions read
/// earlier writes before falling back to committed state.
struct ExecutionScope<'a> {
    processor: &'a NativeProcessor,
    read_height: BlockHeight,
    overlay: HashMap<(String, Vec<u8>), Vec<u8>>,
    /// Contracts in first-write order, records in write order.
    writes: Vec<(String, Vec<StateRecord>)>,
}

impl NativeProcessor {
    pub fn new(state: Arc<StateStorageService>) -> Self {
        Self { state }
    }

    fn is_known_contract(contract_name: &str) -> bool {
        matches!(
            contract_name,
            CONTRACT_BENCHMARK_TOKEN | CONTRACT_COUNTER | CONTRACT_ELECTIONS
        )
    }

    async fn read_committed(
        &self,
        height: BlockHeight,
        contract: &str,
        key: &[u8],
    ) -> Result<Vec<u8>, String> {
        let records = self
            .state
            .read_keys(height, contract, &[key.to_vec()])
            .await
            .map_err(|e| e.to_string())?;
        Ok(records.into_iter().next().map(|r| r.value).unwrap_or_default())
    }
}

impl<'a> ExecutionScope<'a> {
    fn new(processor: &'a NativeProcessor, read_height: BlockHeight) -> Self {
        Self { processor, read_height, overlay: HashMap::new(), writes: Vec::new() }
    }

    async fn read(&self, contract: &str, key: &[u8]) -> Result<Vec<u8>, String> {
        if let Some(value) = self.overlay.get(&(contract.to_string(), key.to_vec())) {
            return Ok(value.clone());
        }
        self.processor.read_committed(self.read_height, contract, key).await
    }

    async fn read_u64(&self, contract: &str, key: &[u8]) -> Result<u64, String> {
        let bytes = self.read(contract, key).await?;
        if bytes.is_empty() {
            return Ok(0);
        }
        let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| "bad u64 state value")?;
        Ok(u64::from_be_bytes(arr))
    }

    fn write(&mut self, contract: &str, key: Vec<u8>, value: Vec<u8>) {
        self.overlay.insert((contract.to_string(), key.clone()), value.clone());
        let record = StateRecord { key, value };
        if let Some((_, records)) = self.writes.iter_mut().find(|(name, _)| name == contract) {
            records.push(record);
        } else {
            self.writes.push((contract.to_string(), vec![record]));
        }
    }

    fn write_u64(&mut self, contract: &str, key: Vec<u8>, value: u64) {
        self.write(contract, key, value.to_be_bytes().to_vec());
    }

    /// Run one transaction; contract failures become error receipts,
    /// only infrastructure failures propagate.
    async fn execute(
        &mut self,
        transaction: &SignedTransaction,
    ) -> Result<(ExecutionResult, Vec<Argument>), String> {
        let tx = &transaction.transaction;
        match (tx.contract_name.as_str(), tx.method_name.as_str()) {
            (CONTRACT_BENCHMARK_TOKEN, "init") => {
                let (balance, account) = (arg_u64(tx, 0)?, arg_u64(tx, 1)?);
                self.write_u64(CONTRACT_BENCHMARK_TOKEN, balance_key(account), balance);
                Ok((ExecutionResult::Success, vec![]))
            }
            (CONTRACT_BENCHMARK_TOKEN, "transfer") => {
                let (amount, from, to) = (arg_u64(tx, 0)?, arg_u64(tx, 1)?, arg_u64(tx, 2)?);
                let from_balance =
                    self.read_u64(CONTRACT_BENCHMARK_TOKEN, &balance_key(from)).await?;
                if from_balance < amount {
                    return Ok((
                        ExecutionResult::ErrorSmartContract,
                        vec![Argument::String("insufficient balance".into())],
                    ));
                }
                let to_balance = self.read_u64(CONTRACT_BENCHMARK_TOKEN, &balance_key(to)).await?;
                self.write_u64(CONTRACT_BENCHMARK_TOKEN, balance_key(from), from_balance - amount);
                self.write_u64(CONTRACT_BENCHMARK_TOKEN, balance_key(to), to_balance + amount);
                Ok((ExecutionResult::Success, vec![]))
            }
            (CONTRACT_BENCHMARK_TOKEN, "getBalance") => {
                let account = arg_u64(tx, 0)?;
                let balance = self.read_u64(CONTRACT_BENCHMARK_TOKEN, &balance_key(account)).await?;
                Ok((ExecutionResult::Success, vec![Argument::Uint64(balance)]))
            }
            (CONTRACT_COUNTER, "init") => {
                let start = arg_u64(tx, 0)?;
                self.write_u64(CONTRACT_COUNTER, b"count".to_vec(), start);
                Ok((ExecutionResult::Success, vec![]))
            }
            (CONTRACT_COUNTER, "add") => {
                let n = arg_u64(tx, 0)?;
                let count = self.read_u64(CONTRACT_COUNTER, b"count").await?;
                self.write_u64(CONTRACT_COUNTER, b"count".to_vec(), count + n);
                Ok((ExecutionResult::Success, vec![]))
            }
            (CONTRACT_COUNTER, "get") => {
                let count = self.read_u64(CONTRACT_COUNTER, b"count").await?;
                Ok((ExecutionResult::Success, vec![Argument::Uint64(count)]))
            }
            _ => Ok((
                ExecutionResult::ErrorInput,
                vec![Argument::String("unknown contract or method".into())],
            )),
        }
    }

    fn into_diffs(self) -> Vec<ContractStateDiff> {
        self.writes
            .into_iter()
            .map(|(contract_name, records)| ContractStateDiff { contract_name, records })
            .collect()
    }
}

fn balance_key(account: u64) -> Vec<u8> {
    format!("balance_{}", account).into_bytes()
}

fn arg_u64(tx: &shared_types::Transaction, index: usize) -> Result<u64, String> {
    tx.arguments
        .get(index)
        .and_then(Argument::as_u64)
        .ok_or_else(|| format!("argument {} is not a u64", index))
}

#[async_trait]
impl VmExecutor for NativeProcessor {
    async fn process_transaction_set(
        &self,
        block_height: BlockHeight,
        transactions: &[SignedTransaction],
    ) -> Result<ProcessedTransactionSet, CtxPortError> {
        let mut scope = ExecutionScope::new(self, block_height - 1);
        let mut transaction_receipts = Vec::with_capacity(transactions.len());

        for transaction in transactions {
            let (execution_result, output) =
                scope.execute(transaction).await.map_err(CtxPortError)?;
            transaction_receipts.push(TransactionReceipt {
                txhash: calc_tx_hash(&transaction.transaction),
                execution_result,
                output,
            });
        }
        debug!(
            block_height,
            transactions = transactions.len(),
            "transaction set processed"
        );
        Ok(ProcessedTransactionSet {
            transaction_receipts,
            contract_state_diffs: scope.into_diffs(),
        })
    }

    async fn call_system_contract(
        &self,
        block_height: BlockHeight,
        contract_name: &str,
        method_name: &str,
    ) -> Result<Vec<Argument>, CtxPortError> {
        match (contract_name, method_name) {
            (CONTRACT_ELECTIONS, "getElectedValidators") => {
                let packed = self
                    .read_committed(block_height, CONTRACT_ELECTIONS, ELECTED_VALIDATORS_KEY)
                    .await
                    .map_err(CtxPortError)?;
                Ok(vec![Argument::Bytes(packed)])
            }
            _ => Err(CtxPortError(format!(
                "unknown system contract {}.{}",
                contract_name, method_name
            ))),
        }
    }
}

#[async_trait]
impl PreOrderChecker for NativeProcessor {
    async fn check_transaction(
        &self,
        transaction: &SignedTransaction,
    ) -> Result<(), PoolPortError> {
        let contract = &transaction.transaction.contract_name;
        if Self::is_known_contract(contract) {
            Ok(())
        } else {
            Err(PoolPortError(format!("unknown contract {}", contract)))
        }
    }
}

//! Block fixtures shared by the adapter tests.

use shared_types::{
    BlockPair, BlockProof, ExecutionResult, ResultsBlock, ResultsBlockHeader, TimestampNano,
    TransactionReceipt, TransactionsBlock, TransactionsBlockHeader,
};

/// A minimal block pair at `height` with one receipt (txhash `[7; 32]`).
pub fn block_pair_at(height: u64, timestamp: TimestampNano) -> BlockPair {
    BlockPair {
        transactions_block: TransactionsBlock {
            header: TransactionsBlockHeader {
                protocol_version: 1,
                virtual_chain_id: 42,
                block_height: height,
                prev_block_hash: [0; 32],
                timestamp,
                num_signed_transactions: 0,
            },
            metadata: vec![],
            signed_transactions: vec![],
            proof: BlockProof::default(),
        },
        results_block: ResultsBlock {
            header: ResultsBlockHeader {
                protocol_version: 1,
                virtual_chain_id: 42,
                block_height: height,
                prev_block_hash: [0; 32],
                timestamp,
                pre_execution_state_root: [0; 32],
                post_execution_state_root: [0; 32],
                num_transaction_receipts: 1,
            },
            transaction_receipts: vec![TransactionReceipt {
                txhash: [7; 32],
                execution_result: ExecutionResult::Success,
                output: vec![],
            }],
            contract_state_diffs: vec![],
            proof: BlockProof::default(),
        },
    }
}

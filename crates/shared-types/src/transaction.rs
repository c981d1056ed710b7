//! # Transactions
//!
//! Signed client transactions, their execution receipts, and the status
//! taxonomy used by the transaction pool's admission pipeline.

use crate::primitives::{Hash, ProtocolVersion, TimestampNano, VirtualChainId};
use serde::{Deserialize, Serialize};

/// A typed method argument. The argument list is part of the canonical
/// transaction bytes, so the variant encoding must stay stable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Argument {
    Uint32(u32),
    Uint64(u64),
    String(String),
    Bytes(Vec<u8>),
}

impl Argument {
    /// Extract a u64, if this argument holds one.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Argument::Uint64(v) => Some(*v),
            _ => None,
        }
    }
}

/// The signed payload of a transaction. `txhash` is the SHA-256 of the
/// canonical encoding of this struct.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub protocol_version: ProtocolVersion,
    pub virtual_chain_id: VirtualChainId,
    pub contract_name: String,
    pub method_name: String,
    pub arguments: Vec<Argument>,
    pub timestamp: TimestampNano,
    /// Uncompressed secp256k1 public key of the signer (65 bytes, 0x04-prefixed).
    pub signer_public_key: Vec<u8>,
}

/// A transaction plus the signer's recoverable ECDSA signature over its
/// canonical bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    /// 65-byte recoverable signature (r ‖ s ‖ v).
    pub signature: Vec<u8>,
}

/// Outcome of executing a transaction against the virtual machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionResult {
    Success,
    ErrorSmartContract,
    ErrorInput,
}

/// Admission / lifecycle status of a transaction as seen by the pool.
///
/// Statuses other than `Pending` and `Committed` are terminal rejections
/// surfaced to the submitting client in a receipt-shaped reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Committed,
    DuplicateTransactionAlreadyPending,
    DuplicateTransactionAlreadyCommitted,
    RejectedUnsupportedVersion,
    RejectedVirtualChainMismatch,
    RejectedMalformedTransaction,
    RejectedSignatureMismatch,
    RejectedTimestampWindowExceeded,
    RejectedCongestion,
    RejectedSmartContractPreOrder,
}

impl TransactionStatus {
    /// True for every status that denies admission.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, TransactionStatus::Pending | TransactionStatus::Committed)
    }
}

/// Per-transaction record of execution attached to a results block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub txhash: Hash,
    pub execution_result: ExecutionResult,
    pub output: Vec<Argument>,
}

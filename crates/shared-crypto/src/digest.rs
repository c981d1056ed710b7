//! # Digests
//!
//! Canonical hashes of the data model: txhash, block hashes, and the
//! node-address derivation. Canonical bytes are the bincode encoding of
//! the typed structures; field order is fixed by the struct layout, so
//! the encoding is stable across nodes.

use crate::errors::CryptoError;
use crate::hashing::{calc_keccak256, calc_sha256};
use shared_types::{
    BlockPair, Hash, NodeAddress, ResultsBlockHeader, Transaction, TransactionsBlockHeader,
    NODE_ADDRESS_SIZE,
};

/// `txhash = SHA-256(canonical transaction bytes)`.
pub fn calc_tx_hash(transaction: &Transaction) -> Hash {
    let bytes = bincode::serialize(transaction)
        .unwrap_or_else(|_| unreachable!("transaction encoding cannot fail"));
    calc_sha256(&bytes)
}

/// Hash of a transactions block: SHA-256 of its header's canonical bytes.
pub fn calc_transactions_block_hash(header: &TransactionsBlockHeader) -> Hash {
    let bytes = bincode::serialize(header)
        .unwrap_or_else(|_| unreachable!("header encoding cannot fail"));
    calc_sha256(&bytes)
}

/// Hash of a results block: SHA-256 of its header's canonical bytes.
pub fn calc_results_block_hash(header: &ResultsBlockHeader) -> Hash {
    let bytes = bincode::serialize(header)
        .unwrap_or_else(|_| unreachable!("header encoding cannot fail"));
    calc_sha256(&bytes)
}

/// Hash of a block pair: SHA-256 over both half hashes. This is what
/// consensus proofs sign.
pub fn calc_block_pair_hash(pair: &BlockPair) -> Hash {
    let mut joined = Vec::with_capacity(64);
    joined.extend_from_slice(&calc_transactions_block_hash(&pair.transactions_block.header));
    joined.extend_from_slice(&calc_results_block_hash(&pair.results_block.header));
    calc_sha256(&joined)
}

/// Derive a node address: the last 20 bytes of Keccak-256 of the 64-byte
/// public key point. Accepts the key 0x04-prefixed (65 bytes) or raw
/// (64 bytes).
pub fn calc_node_address_from_public_key(public_key: &[u8]) -> Result<NodeAddress, CryptoError> {
    let point: &[u8] = match public_key.len() {
        65 if public_key[0] == 0x04 => &public_key[1..],
        64 => public_key,
        _ => return Err(CryptoError::InvalidPublicKey),
    };
    let digest = calc_keccak256(point);
    NodeAddress::try_from_slice(&digest[32 - NODE_ADDRESS_SIZE..])
        .ok_or(CryptoError::InvalidPublicKey)
}

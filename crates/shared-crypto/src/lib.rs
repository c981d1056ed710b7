//! # Shared Crypto
//!
//! Cryptographic primitives for the node:
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hashing` | SHA-256, Keccak-256 | State trie, txhash, node addresses |
//! | `ecdsa` | secp256k1 + recovery | Transaction and block-proof signing |
//! | `digest` | canonical encodings | txhash, block hashes, address derivation |
//!
//! Signing is RFC 6979 deterministic; every signature is recoverable so
//! a 20-byte node address is all a verifier needs.

pub mod digest;
pub mod ecdsa;
pub mod errors;
pub mod hashing;

pub use digest::{
    calc_block_pair_hash, calc_node_address_from_public_key, calc_results_block_hash,
    calc_transactions_block_hash, calc_tx_hash,
};
pub use ecdsa::{recover_signer_address, sign_message, NodeKeyPair};
pub use errors::CryptoError;
pub use hashing::{calc_keccak256, calc_sha256, EMPTY_SHA256};

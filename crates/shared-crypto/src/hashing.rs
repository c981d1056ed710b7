//! # Hashing
//!
//! SHA-256 for content addressing (txhash, Merkle nodes, block frames)
//! and Keccak-256 for node-address derivation.

use shared_types::Hash;
use sha2::{Digest, Sha256};
use sha3::Keccak256;

/// SHA-256 of the empty byte string; the "absent value" hash in the
/// state trie.
pub const EMPTY_SHA256: Hash = [
    0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f, 0xb9,
    0x24, 0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b, 0x78, 0x52,
    0xb8, 0x55,
];

/// SHA-256 digest of `data`.
pub fn calc_sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Keccak-256 digest of `data`.
pub fn calc_keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sha256_constant_matches() {
        assert_eq!(calc_sha256(b""), EMPTY_SHA256);
    }

    #[test]
    fn test_sha256_known_vector() {
        // "abc" from FIPS 180-2.
        let expected =
            hex::decode("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
                .unwrap();
        assert_eq!(calc_sha256(b"abc").to_vec(), expected);
    }

    #[test]
    fn test_keccak256_known_vector() {
        // Keccak-256 (not SHA3-256) of the empty string.
        let expected =
            hex::decode("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470")
                .unwrap();
        assert_eq!(calc_keccak256(b"").to_vec(), expected);
    }
}

//! # ECDSA (secp256k1, recoverable)
//!
//! Node identity and transaction signing. Signatures are 65 bytes
//! (r ‖ s ‖ v) so the signer's public key, and from it the 20-byte node
//! address, can be recovered without distributing keys.

use crate::digest::calc_node_address_from_public_key;
use crate::errors::CryptoError;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use shared_types::NodeAddress;

/// Length of a recoverable signature in bytes.
pub const SIGNATURE_SIZE: usize = 65;

/// A node's secp256k1 keypair.
pub struct NodeKeyPair {
    signing_key: SigningKey,
}

impl NodeKeyPair {
    /// Generate a random keypair (tests and tooling).
    pub fn generate() -> Self {
        Self { signing_key: SigningKey::random(&mut rand::thread_rng()) }
    }

    /// Build from a 32-byte secret scalar.
    pub fn from_private_key(bytes: &[u8]) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_slice(bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Secret scalar bytes.
    pub fn private_key(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }

    /// Uncompressed public key (65 bytes, 0x04-prefixed).
    pub fn public_key(&self) -> Vec<u8> {
        self.signing_key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    /// Node address derived from the public key.
    pub fn address(&self) -> NodeAddress {
        calc_node_address_from_public_key(&self.public_key())
            .unwrap_or_else(|_| unreachable!("own public key is always well-formed"))
    }

    /// Sign `message`, returning the 65-byte recoverable signature.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        sign_message(&self.signing_key, message)
    }
}

/// Sign `message` with a signing key (r ‖ s ‖ v form).
pub fn sign_message(signing_key: &SigningKey, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let (signature, recovery_id) = signing_key
        .sign_recoverable(message)
        .map_err(|_| CryptoError::SigningFailed)?;
    let mut out = Vec::with_capacity(SIGNATURE_SIZE);
    out.extend_from_slice(signature.to_bytes().as_slice());
    out.push(recovery_id.to_byte());
    Ok(out)
}

/// Recover the uncompressed public key that produced `signature` over
/// `message`.
pub fn recover_public_key(message: &[u8], signature: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if signature.len() != SIGNATURE_SIZE {
        return Err(CryptoError::InvalidSignature);
    }
    let sig =
        Signature::from_slice(&signature[..64]).map_err(|_| CryptoError::InvalidSignature)?;
    let recovery_id =
        RecoveryId::from_byte(signature[64]).ok_or(CryptoError::InvalidSignature)?;
    let verifying_key = VerifyingKey::recover_from_msg(message, &sig, recovery_id)
        .map_err(|_| CryptoError::SignatureVerificationFailed)?;
    Ok(verifying_key.to_encoded_point(false).as_bytes().to_vec())
}

/// Recover the node address that signed `message`.
pub fn recover_signer_address(
    message: &[u8],
    signature: &[u8],
) -> Result<NodeAddress, CryptoError> {
    let public_key = recover_public_key(message, signature)?;
    calc_node_address_from_public_key(&public_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_recover_address() {
        let keypair = NodeKeyPair::generate();
        let signature = keypair.sign(b"hello federation").unwrap();
        assert_eq!(signature.len(), SIGNATURE_SIZE);

        let recovered = recover_signer_address(b"hello federation", &signature).unwrap();
        assert_eq!(recovered, keypair.address());
    }

    #[test]
    fn test_recover_wrong_message_yields_different_address() {
        let keypair = NodeKeyPair::generate();
        let signature = keypair.sign(b"message one").unwrap();
        match recover_signer_address(b"message two", &signature) {
            Ok(addr) => assert_ne!(addr, keypair.address()),
            Err(_) => {} // recovery may also fail outright
        }
    }

    #[test]
    fn test_keypair_roundtrip_through_private_key() {
        let keypair = NodeKeyPair::generate();
        let restored = NodeKeyPair::from_private_key(&keypair.private_key()).unwrap();
        assert_eq!(keypair.address(), restored.address());
    }

    #[test]
    fn test_malformed_signature_rejected() {
        assert_eq!(
            recover_public_key(b"m", &[0u8; 10]).unwrap_err(),
            CryptoError::InvalidSignature
        );
        assert!(recover_public_key(b"m", &[0u8; 65]).is_err());
    }
}

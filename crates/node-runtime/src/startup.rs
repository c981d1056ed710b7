//! # Startup Validation
//!
//! Fatal pre-flight checks. A node that passes these either runs or
//! fails loudly later for a new reason; one that fails them must not
//! join the federation at all.

use shared_crypto::{recover_signer_address, NodeKeyPair};
use shared_types::{NodeAddress, NodeConfig};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("genesis federation must not be empty")]
    EmptyFederation,

    #[error("consensus leader {0} is not a federation member")]
    LeaderNotInFederation(NodeAddress),

    #[error(
        "block sync no-commit interval ({no_commit_ms} ms) must strictly exceed \
         the consensus retry interval ({retry_ms} ms)"
    )]
    IntervalOrdering { no_commit_ms: u128, retry_ms: u128 },

    #[error("node private key is invalid: {0}")]
    InvalidKey(String),

    #[error("node address {configured} does not match address {derived} derived from the key")]
    KeyAddressMismatch {
        configured: NodeAddress,
        derived: NodeAddress,
    },

    #[error("node failed to start: {0}")]
    Other(String),
}

/// Validate `config`; returns the node's keypair on success.
pub fn validate_config(config: &NodeConfig) -> Result<NodeKeyPair, StartupError> {
    if config.genesis_federation.is_empty() {
        return Err(StartupError::EmptyFederation);
    }
    if !config
        .genesis_federation
        .iter()
        .any(|node| node.address == config.constant_consensus_leader)
    {
        return Err(StartupError::LeaderNotInFederation(config.constant_consensus_leader));
    }
    if config.block_sync_no_commit_interval <= config.benchmark_consensus_retry_interval {
        return Err(StartupError::IntervalOrdering {
            no_commit_ms: config.block_sync_no_commit_interval.as_millis(),
            retry_ms: config.benchmark_consensus_retry_interval.as_millis(),
        });
    }

    // Key ↔ address consistency: sign a known message, recover, and
    // compare the derived address against the configured one.
    let keypair = NodeKeyPair::from_private_key(&config.node_private_key)
        .map_err(|e| StartupError::InvalidKey(e.to_string()))?;
    let probe = [0u8; 32];
    let signature =
        keypair.sign(&probe).map_err(|e| StartupError::InvalidKey(e.to_string()))?;
    let derived = recover_signer_address(&probe, &signature)
        .map_err(|e| StartupError::InvalidKey(e.to_string()))?;
    if derived != config.node_address {
        return Err(StartupError::KeyAddressMismatch {
            configured: config.node_address,
            derived,
        });
    }
    Ok(keypair)
}

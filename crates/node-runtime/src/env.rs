//! # Environment Configuration
//!
//! The node binary is configured entirely from the environment:
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `PORT` | RPC gateway attach port |
//! | `GOSSIP_PORT` | TCP transport listen port |
//! | `NODE_PUBLIC_KEY` | hex, uncompressed secp256k1 key |
//! | `NODE_PRIVATE_KEY` | hex, 32-byte secret scalar |
//! | `GOSSIP_PEERS` | comma-separated `host:port` endpoints |
//! | `FEDERATION_NODES` | comma-separated hex node addresses, paired with `GOSSIP_PEERS` by index |
//! | `CONSENSUS_LEADER` | hex node address of the constant leader |
//! | `LOG_PATH` | optional log file |
//! | `DATA_DIR` | optional block file directory (in-memory when unset) |

use shared_crypto::calc_node_address_from_public_key;
use shared_types::{FederationNode, NodeAddress, NodeConfig};
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    #[error("environment variable {name} is malformed: {reason}")]
    Malformed { name: &'static str, reason: String },

    #[error(
        "FEDERATION_NODES lists {federation} nodes but GOSSIP_PEERS lists {peers} endpoints"
    )]
    FederationPeerMismatch { federation: usize, peers: usize },
}

fn required(name: &'static str) -> Result<String, EnvConfigError> {
    env::var(name).ok().filter(|v| !v.is_empty()).ok_or(EnvConfigError::Missing(name))
}

fn parse_port(name: &'static str, default: u16) -> Result<u16, EnvConfigError> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => value
            .parse()
            .map_err(|_| EnvConfigError::Malformed { name, reason: "not a port number".into() }),
        _ => Ok(default),
    }
}

fn parse_hex(name: &'static str) -> Result<Vec<u8>, EnvConfigError> {
    hex::decode(required(name)?.trim())
        .map_err(|e| EnvConfigError::Malformed { name, reason: e.to_string() })
}

fn parse_address(name: &'static str, value: &str) -> Result<NodeAddress, EnvConfigError> {
    NodeAddress::try_from_hex(value)
        .ok_or(EnvConfigError::Malformed { name, reason: format!("bad address '{}'", value) })
}

/// Assemble a `NodeConfig` from the environment; everything the
/// environment does not name keeps its default.
pub fn load_node_config() -> Result<NodeConfig, EnvConfigError> {
    let node_public_key = parse_hex("NODE_PUBLIC_KEY")?;
    let node_private_key = parse_hex("NODE_PRIVATE_KEY")?;
    let node_address =
        calc_node_address_from_public_key(&node_public_key).map_err(|e| {
            EnvConfigError::Malformed { name: "NODE_PUBLIC_KEY", reason: e.to_string() }
        })?;

    let federation_addresses: Vec<NodeAddress> = required("FEDERATION_NODES")?
        .split(',')
        .map(|part| parse_address("FEDERATION_NODES", part))
        .collect::<Result<_, _>>()?;
    let peer_endpoints: Vec<String> =
        required("GOSSIP_PEERS")?.split(',').map(|s| s.trim().to_string()).collect();
    if federation_addresses.len() != peer_endpoints.len() {
        return Err(EnvConfigError::FederationPeerMismatch {
            federation: federation_addresses.len(),
            peers: peer_endpoints.len(),
        });
    }

    let genesis_federation = federation_addresses
        .into_iter()
        .zip(peer_endpoints)
        .map(|(address, endpoint)| {
            let (host, port) = endpoint.rsplit_once(':').ok_or(EnvConfigError::Malformed {
                name: "GOSSIP_PEERS",
                reason: format!("endpoint '{}' is not host:port", endpoint),
            })?;
            let gossip_port = port.parse().map_err(|_| EnvConfigError::Malformed {
                name: "GOSSIP_PEERS",
                reason: format!("bad port in '{}'", endpoint),
            })?;
            Ok(FederationNode { address, gossip_endpoint: host.to_string(), gossip_port })
        })
        .collect::<Result<Vec<_>, EnvConfigError>>()?;

    let constant_consensus_leader =
        parse_address("CONSENSUS_LEADER", &required("CONSENSUS_LEADER")?)?;

    Ok(NodeConfig {
        node_address,
        node_public_key,
        node_private_key,
        genesis_federation,
        constant_consensus_leader,
        gossip_listen_port: parse_port("GOSSIP_PORT", NodeConfig::default().gossip_listen_port)?,
        http_port: parse_port("PORT", NodeConfig::default().http_port)?,
        log_path: env::var("LOG_PATH").ok().filter(|v| !v.is_empty()).map(Into::into),
        data_dir: env::var("DATA_DIR").ok().filter(|v| !v.is_empty()).map(Into::into),
        ..NodeConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::NodeKeyPair;

    // Environment-variable tests mutate process state, so they run in
    // one test to avoid interleaving.
    #[test]
    fn test_load_node_config_roundtrip() {
        let keypair = NodeKeyPair::generate();
        let peer = NodeKeyPair::generate();
        env::set_var("NODE_PUBLIC_KEY", hex::encode(keypair.public_key()));
        env::set_var("NODE_PRIVATE_KEY", hex::encode(keypair.private_key()));
        env::set_var(
            "FEDERATION_NODES",
            format!("{},{}", keypair.address(), peer.address()),
        );
        env::set_var("GOSSIP_PEERS", "127.0.0.1:4400, 127.0.0.1:4401");
        env::set_var("CONSENSUS_LEADER", keypair.address().to_string());
        env::set_var("GOSSIP_PORT", "4400");
        env::set_var("PORT", "8091");
        env::remove_var("LOG_PATH");
        env::remove_var("DATA_DIR");

        let config = load_node_config().unwrap();
        assert_eq!(config.node_address, keypair.address());
        assert_eq!(config.genesis_federation.len(), 2);
        assert_eq!(config.genesis_federation[1].gossip_port, 4401);
        assert_eq!(config.constant_consensus_leader, keypair.address());
        assert_eq!(config.http_port, 8091);
        assert!(config.data_dir.is_none());

        // Mismatched peer list is rejected.
        env::set_var("GOSSIP_PEERS", "127.0.0.1:4400");
        assert!(matches!(
            load_node_config(),
            Err(EnvConfigError::FederationPeerMismatch { federation: 2, peers: 1 })
        ));

        // Missing key is rejected.
        env::remove_var("NODE_PUBLIC_KEY");
        assert!(matches!(
            load_node_config(),
            Err(EnvConfigError::Missing("NODE_PUBLIC_KEY"))
        ));
    }
}

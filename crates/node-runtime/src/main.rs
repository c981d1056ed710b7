//! # Fedledger Node Binary
//!
//! Reads its configuration from the environment, validates it, starts
//! the TCP transport and the node, and runs until interrupted. Exits 0
//! on a clean shutdown and non-zero on any startup failure.

use anyhow::Context;
use fl_gossip::{DirectTransport, DirectTransportConfig};
use node_runtime::{env, Node};
use shared_types::NodeConfig;
use std::collections::HashMap;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &NodeConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match &config.log_path {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = env::load_node_config().context("loading configuration from environment")?;
    init_tracing(&config)?;

    info!("===========================================");
    info!("  Fedledger Node v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");

    let peers: HashMap<_, _> = config
        .genesis_federation
        .iter()
        .filter(|node| node.address != config.node_address)
        .map(|node| (node.address, node.gossip_socket_addr()))
        .collect();
    let (transport_shutdown_tx, transport_shutdown_rx) = watch::channel(false);
    let transport = DirectTransport::start(
        DirectTransportConfig {
            node_address: config.node_address,
            listen_port: config.gossip_listen_port,
            peers,
            keep_alive_interval: config.keep_alive_interval,
            connection_retry_backoff: config.connection_retry_backoff,
            send_queue_max_bytes: config.send_queue_max_bytes,
            send_queue_max_messages: config.send_queue_max_messages,
        },
        transport_shutdown_rx,
    )
    .await
    .context("starting gossip transport")?;

    let node = Node::start(config, transport).await.context("starting node")?;

    info!("node is running; Ctrl+C to stop");
    tokio::signal::ctrl_c().await.context("waiting for interrupt")?;

    info!("shutting down");
    node.shutdown();
    let _ = transport_shutdown_tx.send(true);
    // Bounded drain for supervised tasks and peer connections.
    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    Ok(())
}

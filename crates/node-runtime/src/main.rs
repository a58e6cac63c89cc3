//! # BlackTrace Node
//!
//! Entry point: configuration, logging, wiring, gateway serve loop.

use anyhow::Result;
use node_runtime::{Node, NodeConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => NodeConfig::load(&path)?,
        None => NodeConfig::default(),
    };

    info!("===========================================");
    info!("  BlackTrace Node Runtime v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");

    let node = Node::build(config)?;
    info!(peer = %node.network.local_peer, "peer id");
    info!(token = %node.operator_token, "operator session token");
    info!("Node is running. Press Ctrl+C to stop.");

    node.serve().await
}

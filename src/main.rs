//! DriftKV server entry point.
//!
//! Opens (or creates) the store and serves RESP clients over TCP. On Ctrl+C
//! or SIGTERM it stops accepting, lets open connections finish, stops the
//! scheduler and writes a final snapshot.

use anyhow::Context;
use clap::Parser;
use driftkv::server::{shutdown_signal, Server};
use driftkv::storage::Store;
use driftkv::Config;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!(version = driftkv::VERSION, "Starting DriftKV");

    let store = Store::open(&config.dump, config.store_config())
        .with_context(|| format!("failed to open store at {}", config.dump.display()))?;
    let store = Arc::new(store);
    info!(entries = store.len(), "Store ready");

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!(address = %config.bind_address(), "Listening for connections");

    let server = Server::new(listener, store);
    let stats = server.stats();

    server
        .run(shutdown_signal())
        .await
        .context("final snapshot failed")?;

    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}

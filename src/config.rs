//! Server configuration from command-line flags and environment variables.
//!
//! Every flag falls back to a `DRIFTKV_*` environment variable, then to its
//! default. Flags win over the environment.

use crate::storage::StoreConfig;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// DriftKV server configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "driftkv", version)]
#[command(about = "An in-memory key-value store with per-key TTL and snapshot persistence")]
pub struct Config {
    /// Host to bind to
    #[arg(long, env = "DRIFTKV_HOST", default_value = crate::DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "DRIFTKV_PORT", default_value_t = crate::DEFAULT_PORT)]
    pub port: u16,

    /// Snapshot file to restore from and persist to
    #[arg(long, env = "DRIFTKV_DUMP", default_value = crate::DEFAULT_DUMP_PATH)]
    pub dump: PathBuf,

    /// Seconds between scheduled snapshots
    #[arg(
        long,
        env = "DRIFTKV_SNAPSHOT_INTERVAL",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub snapshot_interval: u64,

    /// Milliseconds between expiry sweeps
    #[arg(
        long,
        env = "DRIFTKV_SWEEP_INTERVAL_MS",
        default_value_t = 1000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub sweep_interval_ms: u64,
}

impl Config {
    /// Returns the bind address as `host:port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Scheduler settings for [`Store::open`](crate::storage::Store::open).
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::default()
            .with_sweep_interval(Duration::from_millis(self.sweep_interval_ms))
            .with_snapshot_interval(Duration::from_secs(self.snapshot_interval))
    }
}

//! # DriftKV - An In-Memory Key-Value Store with TTL and Snapshots
//!
//! DriftKV keeps string values in memory, lets each key carry an optional
//! time-to-live, removes expired keys in the background, and periodically
//! writes the whole store to a snapshot file it can restart from.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              DriftKV                                 │
//! │                                                                      │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐               │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │               │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │               │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘               │
//! │                                               ▼                      │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐ │
//! │  │   RESP      │    │ Store                                        │ │
//! │  │   Parser    │    │  StorageEngine: RwLock { map, ExpiryIndex }  │ │
//! │  └─────────────┘    │  snapshot file <──> restore / snapshot       │ │
//! │                     └──────────────────────────────────────────────┘ │
//! │                                               ▲                      │
//! │                     ┌─────────────────────────┴────────────────────┐ │
//! │                     │   Scheduler: sweep tick + snapshot tick      │ │
//! │                     └──────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use driftkv::server::{shutdown_signal, Server};
//! use driftkv::storage::{Store, StoreConfig};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(Store::open("storage.snapshot", StoreConfig::default())?);
//!     let listener = TcpListener::bind("127.0.0.1:5330").await?;
//!
//!     // Serves until Ctrl+C or SIGTERM, then writes the final snapshot
//!     Server::new(listener, store).run(shutdown_signal()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: entries, expiry index, engine, snapshots, scheduler, store
//! - [`protocol`]: RESP parser and types
//! - [`commands`]: maps RESP requests onto store operations
//! - [`connection`]: client connection management
//! - [`server`]: accept loop, signal handling and graceful shutdown
//! - [`config`]: command-line and environment configuration
//!
//! ## Expiry
//!
//! Expiry is active only. An expired key stays readable until the next
//! sweep removes it; with the default one-second sweep that is at most about
//! a second. Deadlines are kept sorted, so a sweep costs a binary search plus
//! the number of keys it removes.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

pub use commands::CommandHandler;
pub use config::Config;
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{ParseError, RespParser, RespValue};
pub use server::{shutdown_signal, Server};
pub use storage::{Entry, StorageEngine, Store, StoreConfig, StoreError};

/// The default port DriftKV listens on
pub const DEFAULT_PORT: u16 = 5330;

/// The default host DriftKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// The default snapshot file, relative to the working directory
pub const DEFAULT_DUMP_PATH: &str = "storage.snapshot";

/// Version of DriftKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Connection Handler Module
//!
//! Each accepted TCP connection runs in its own Tokio task, reading RESP
//! requests, executing them through a [`CommandHandler`](crate::commands::CommandHandler)
//! and writing the replies back.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              TcpListener (server.rs)         │
//! └──────────────────────┬───────────────────────┘
//!                        │ accept() + spawn
//!                        ▼
//! ┌──────────────────────────────────────────────┐
//! │             ConnectionHandler                │
//! │  read bytes ─> parse RESP ─> execute ─> reply│
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Pipelining works: several requests in one packet are all answered, in
//! order, before the next read.

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};

//! Command Handler Module
//!
//! The command layer sits between the network and the store. It receives
//! parsed RESP requests, runs them against the [`Store`](crate::storage::Store)
//! and builds the reply.
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Parser    │  (protocol module)
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │     Store       │  (storage module)
//! └─────────────────┘
//! ```

pub mod handler;

pub use handler::{command_name, CommandHandler};

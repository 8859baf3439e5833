//! Storage Engine Module
//!
//! This module provides the core storage functionality for DriftKV: a
//! thread-safe key-value map with per-key TTL, an ordered index of expiry
//! deadlines, crash-recoverable snapshots and the background task that
//! sweeps and persists.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                              │
//! │  ┌──────────────────────────────────────┐   snapshot file   │
//! │  │           StorageEngine              │ <───────────────> │
//! │  │  RwLock { entries, ExpiryIndex }     │                   │
//! │  └──────────────────────────────────────┘                   │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │ sweep / snapshot
//!              ┌─────────────┴─────────────┐
//!              │        Scheduler          │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use driftkv::storage::StorageEngine;
//! use chrono::TimeDelta;
//!
//! let engine = StorageEngine::new();
//!
//! // Basic operations
//! engine.put("name", "Ariz").unwrap();
//! assert_eq!(engine.get("name").unwrap(), "Ariz");
//!
//! // Set with TTL
//! engine.put_with_ttl("session", "token123", TimeDelta::hours(1)).unwrap();
//! assert_eq!(engine.expiry_index().len(), 1);
//! ```

pub mod engine;
pub mod entry;
pub mod error;
pub mod index;
pub mod scheduler;
pub mod snapshot;
pub mod store;

// Re-export commonly used types
pub use engine::{StorageEngine, StorageStats};
pub use entry::Entry;
pub use error::{SnapshotError, StoreError};
pub use index::{Deadline, ExpiryIndex};
pub use scheduler::Scheduler;
pub use store::{Store, StoreConfig};

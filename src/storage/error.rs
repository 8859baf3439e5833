//! Error types returned by the storage layer.

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key is not present in the store
    #[error("key '{0}' not found")]
    NotFound(String),

    /// An argument could not be accepted (empty key, TTL out of range)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Writing or reading the snapshot file failed
    #[error("snapshot {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: SnapshotError,
    },
}

impl StoreError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: SnapshotError) -> Self {
        StoreError::Persistence {
            path: path.into(),
            source,
        }
    }
}

/// Why a snapshot could not be written or loaded.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// The sections decoded but do not describe a consistent store
    #[error("corrupt snapshot: {0}")]
    Corrupt(String),
}

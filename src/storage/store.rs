//! Store lifecycle: open, serve, close.
//!
//! [`Store`] ties a [`StorageEngine`] to its snapshot file and its
//! background [`Scheduler`]. It dereferences to the engine, so all data
//! operations (`put`, `get`, `delete`, ...) are called on it directly.

use crate::storage::{Scheduler, StorageEngine, StoreError};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::info;

/// Configuration for the store's background scheduler.
///
/// # Example
///
/// ```rust
/// use driftkv::storage::StoreConfig;
/// use std::time::Duration;
///
/// let config = StoreConfig::default()
///     .with_snapshot_interval(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Interval between expiry sweeps (default: 1 second)
    pub sweep_interval: Duration,
    /// Interval between scheduled snapshots (default: 60 seconds)
    pub snapshot_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(1),
            snapshot_interval: Duration::from_secs(60),
        }
    }
}

impl StoreConfig {
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = interval;
        self
    }
}

/// A storage engine backed by a snapshot file, with its scheduler running.
///
/// Build one with [`Store::open`] at startup, share it behind an `Arc`, and
/// call [`Store::close`] once at shutdown.
///
/// # Example
///
/// ```rust,no_run
/// use driftkv::storage::{Store, StoreConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), driftkv::storage::StoreError> {
///     let store = Store::open("storage.snapshot", StoreConfig::default())?;
///     store.put("name", "Ariz")?;
///     store.close().await
/// }
/// ```
#[derive(Debug)]
pub struct Store {
    engine: Arc<StorageEngine>,
    path: PathBuf,
    scheduler: Mutex<Option<Scheduler>>,
}

impl Store {
    /// Opens the store at `path` and starts its scheduler.
    ///
    /// If a snapshot file exists it is restored; otherwise the store starts
    /// empty and an initial snapshot is written. Either kind of failure is
    /// returned, since the store cannot serve without known state.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn open(path: impl Into<PathBuf>, config: StoreConfig) -> Result<Self, StoreError> {
        let path = path.into();

        let engine = if path.is_file() {
            info!(path = %path.display(), "Opening existing snapshot");
            StorageEngine::restore(&path)?
        } else {
            info!(path = %path.display(), "Creating new snapshot");
            let engine = StorageEngine::new();
            engine.snapshot(&path)?;
            engine
        };

        let engine = Arc::new(engine);
        let scheduler = Scheduler::start(Arc::clone(&engine), path.clone(), &config);

        Ok(Self {
            engine,
            path,
            scheduler: Mutex::new(Some(scheduler)),
        })
    }

    /// The snapshot file this store persists to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn engine(&self) -> &Arc<StorageEngine> {
        &self.engine
    }

    /// Writes a snapshot to the store's own path right away.
    pub fn save(&self) -> Result<(), StoreError> {
        self.engine.snapshot(&self.path)
    }

    /// Stops the scheduler, waits for it, and writes a final snapshot.
    ///
    /// The scheduler is always stopped, even when the final snapshot fails;
    /// the error is returned so the caller knows the file may be stale.
    pub async fn close(&self) -> Result<(), StoreError> {
        let scheduler = self
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(scheduler) = scheduler {
            scheduler.shutdown().await;
        }

        self.save()?;
        info!(path = %self.path.display(), entries = self.engine.len(), "Store closed");
        Ok(())
    }
}

impl Deref for Store {
    type Target = StorageEngine;

    fn deref(&self) -> &StorageEngine {
        &self.engine
    }
}

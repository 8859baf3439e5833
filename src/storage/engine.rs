//! Thread-Safe Storage Engine with Expiry Support
//!
//! This module implements the core storage engine for DriftKV: a `HashMap`
//! of entries plus an [`ExpiryIndex`] of TTL deadlines, both guarded by a
//! single `RwLock` so they can never drift apart.
//!
//! ## Design Decisions
//!
//! 1. **One lock**: The map, the index and the live-entry count change
//!    together. Reads (`get`, `get_entry`, `values`) share the lock, every
//!    mutation and the sweep take it exclusively.
//! 2. **Active expiry only**: Expired entries stay visible until the next
//!    sweep removes them. The sweep only looks at the expired suffix of the
//!    index, never at the whole map.
//! 3. **Copy, then write**: Snapshots clone the state under the shared lock
//!    and do their file I/O after releasing it, so writers are only held up
//!    for the copy. A separate snapshot mutex orders concurrent snapshots:
//!    the file on disk always holds the most recent capture.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │                 RwLock<Keyspace>                      │  │
//! │  │  ┌──────────────────────┐  ┌────────────────────────┐ │  │
//! │  │  │ HashMap<key, Entry>  │  │ ExpiryIndex            │ │  │
//! │  │  │ count                │  │ (latest ... soonest)   │ │  │
//! │  │  └──────────────────────┘  └────────────────────────┘ │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::storage::entry::Entry;
use crate::storage::index::{Deadline, ExpiryIndex};
use crate::storage::snapshot::{self, SnapshotData};
use crate::storage::StoreError;
use chrono::{TimeDelta, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Everything guarded by the engine's lock.
#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
    index: ExpiryIndex,
    /// Number of live entries, always equal to `entries.len()`
    count: u64,
}

impl Keyspace {
    fn insert_new(&mut self, entry: Entry) {
        self.entries.insert(entry.key().to_string(), entry);
        self.count += 1;
    }
}

/// Operation counters, for reporting only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub keys: u64,
    pub get_ops: u64,
    pub put_ops: u64,
    pub del_ops: u64,
    pub expired: u64,
    pub snapshots: u64,
}

/// The main storage engine for DriftKV.
///
/// This struct is designed to be wrapped in an `Arc` and shared across
/// client handler tasks and the background scheduler. All operations are
/// thread-safe.
///
/// # Example
///
/// ```
/// use driftkv::storage::StorageEngine;
/// use chrono::TimeDelta;
///
/// let engine = StorageEngine::new();
///
/// engine.put("name", "Ariz").unwrap();
/// assert_eq!(engine.get("name").unwrap(), "Ariz");
///
/// engine.put_with_ttl("session", "abc123", TimeDelta::seconds(60)).unwrap();
/// assert!(engine.get_entry("session").unwrap().remaining_ttl().is_some());
/// ```
#[derive(Debug, Default)]
pub struct StorageEngine {
    keyspace: RwLock<Keyspace>,
    /// Held from capture until the snapshot file is renamed into place
    snapshot_lock: Mutex<()>,

    get_count: AtomicU64,
    put_count: AtomicU64,
    del_count: AtomicU64,
    expired_count: AtomicU64,
    snapshot_count: AtomicU64,
}

impl StorageEngine {
    /// Creates an empty storage engine.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn read(&self) -> RwLockReadGuard<'_, Keyspace> {
        self.keyspace.read().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    fn write(&self) -> RwLockWriteGuard<'_, Keyspace> {
        self.keyspace.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a value without touching its TTL.
    ///
    /// A new key is created without expiry. For an existing key only the
    /// value is replaced; an expiry set earlier stays as it was.
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) -> Result<(), StoreError> {
        let key = non_empty(key.into())?;
        let value = value.into();
        self.put_count.fetch_add(1, Ordering::Relaxed);

        let mut ks = self.write();
        let ks = &mut *ks;
        match ks.entries.get_mut(&key) {
            Some(entry) => entry.value = value,
            None => ks.insert_new(Entry::new(key, value)),
        }
        Ok(())
    }

    /// Stores a value and replaces its TTL.
    ///
    /// Both the value and the expiry are overwritten, whether or not the
    /// key existed before.
    pub fn put_with_ttl(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: TimeDelta,
    ) -> Result<(), StoreError> {
        let key = non_empty(key.into())?;
        let value = value.into();
        self.put_count.fetch_add(1, Ordering::Relaxed);

        let mut ks = self.write();
        let ks = &mut *ks;
        match ks.entries.get_mut(&key) {
            Some(entry) => {
                let expiry = entry.set_expiry(ttl)?;
                entry.value = value;
                ks.index.remove_by_key(&key);
                ks.index.insert(Deadline::new(key, expiry));
            }
            None => {
                let mut entry = Entry::new(key.as_str(), value);
                let expiry = entry.set_expiry(ttl)?;
                ks.index.insert(Deadline::new(key, expiry));
                ks.insert_new(entry);
            }
        }
        Ok(())
    }

    /// Sets a new TTL on an existing key. The value is left alone.
    pub fn set_ttl(&self, key: &str, ttl: TimeDelta) -> Result<(), StoreError> {
        let key = non_empty(key.to_string())?;

        let mut ks = self.write();
        let ks = &mut *ks;
        let entry = ks
            .entries
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;

        let expiry = entry.set_expiry(ttl)?;
        ks.index.remove_by_key(&key);
        ks.index.insert(Deadline::new(key, expiry));
        Ok(())
    }

    /// Gets the value for a key.
    pub fn get(&self, key: &str) -> Result<String, StoreError> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        self.read()
            .entries
            .get(key)
            .map(|entry| entry.value.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    /// Gets the full entry for a key (including its expiry).
    ///
    /// This is what TTL lookups use.
    pub fn get_entry(&self, key: &str) -> Result<Entry, StoreError> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        self.read()
            .entries
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    /// Returns every stored value, in no particular order.
    ///
    /// The values are collected under one read lock and form a consistent
    /// view of a single instant.
    pub fn values(&self) -> Vec<String> {
        let ks = self.read();
        let mut values = Vec::with_capacity(ks.entries.len());
        values.extend(ks.entries.values().map(|entry| entry.value.clone()));
        values
    }

    /// Deletes a key and its index record.
    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let mut ks = self.write();
        let entry = ks
            .entries
            .remove(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        if entry.expiry().is_some() {
            ks.index.remove_by_key(key);
        }
        ks.count -= 1;
        Ok(())
    }

    /// Checks if a key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.read().entries.contains_key(key)
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> u64 {
        self.read().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of the expiry index, latest deadline first.
    pub fn expiry_index(&self) -> Vec<Deadline> {
        self.read().index.to_vec()
    }

    /// Returns database statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len(),
            get_ops: self.get_count.load(Ordering::Relaxed),
            put_ops: self.put_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
            snapshots: self.snapshot_count.load(Ordering::Relaxed),
        }
    }

    /// Removes every entry whose expiry has passed.
    ///
    /// This is called by the background scheduler.
    ///
    /// # Returns
    ///
    /// Returns the number of keys that were removed.
    pub fn sweep_expired(&self) -> u64 {
        let mut ks = self.write();
        let expired = ks.index.sweep_expired(Utc::now());
        if expired.is_empty() {
            return 0;
        }

        for deadline in &expired {
            ks.entries.remove(&deadline.key);
        }
        ks.count = ks.entries.len() as u64;
        drop(ks);

        let removed = expired.len() as u64;
        self.expired_count.fetch_add(removed, Ordering::Relaxed);
        removed
    }

    /// Copies the current state into a [`SnapshotData`].
    fn capture(&self) -> SnapshotData {
        let ks = self.read();
        let expiring = ks
            .index
            .iter()
            .filter_map(|deadline| ks.entries.get(&deadline.key).cloned())
            .collect();

        SnapshotData {
            count: ks.count,
            entries: ks.entries.clone(),
            expiring,
        }
    }

    /// Writes the full state to `path`, replacing the previous snapshot.
    ///
    /// The data lock is only held while the state is copied; encoding and
    /// disk I/O happen afterwards. Concurrent snapshots run one at a time,
    /// so an older capture never replaces a newer file.
    pub fn snapshot(&self, path: &Path) -> Result<(), StoreError> {
        let _ordered = self
            .snapshot_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let data = self.capture();
        snapshot::write(path, &data).map_err(|e| StoreError::persistence(path, e))?;

        self.snapshot_count.fetch_add(1, Ordering::Relaxed);
        debug!(path = %path.display(), entries = data.count, "Snapshot written");
        Ok(())
    }

    /// Builds an engine from the snapshot at `path`.
    pub fn restore(path: &Path) -> Result<Self, StoreError> {
        let (entries, index) = snapshot::read(path)
            .and_then(SnapshotData::into_parts)
            .map_err(|e| StoreError::persistence(path, e))?;

        let count = entries.len() as u64;
        info!(
            path = %path.display(),
            entries = count,
            with_ttl = index.len(),
            "Snapshot restored"
        );

        Ok(Self {
            keyspace: RwLock::new(Keyspace {
                entries,
                index,
                count,
            }),
            ..Self::default()
        })
    }
}

/// Rejects empty keys at the store boundary.
fn non_empty(key: String) -> Result<String, StoreError> {
    if key.is_empty() {
        Err(StoreError::InvalidArgument("key is empty".to_string()))
    } else {
        Ok(key)
    }
}

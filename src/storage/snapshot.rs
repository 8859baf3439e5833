//! Snapshot file codec.
//!
//! A snapshot is three MessagePack values written back to back:
//!
//! ```text
//! ┌──────────────┬──────────────────────────┬───────────────────────────────┐
//! │ count (u64)  │ map: key -> Entry        │ expiry index: [Entry, ...]    │
//! │              │ (every live entry)       │ (TTL-bearing only, in order)  │
//! └──────────────┴──────────────────────────┴───────────────────────────────┘
//! ```
//!
//! Sections are always read in that order. A snapshot that is truncated,
//! fails to decode, carries trailing bytes, or whose sections disagree with
//! each other is rejected as a whole.
//!
//! Writes go to a temporary file in the destination directory which is
//! synced and then renamed over the target, so readers see either the
//! previous snapshot or the new one, never a partial file.

use crate::storage::entry::Entry;
use crate::storage::index::{Deadline, ExpiryIndex};
use crate::storage::SnapshotError;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// A point-in-time copy of the store, as stored on disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotData {
    pub count: u64,
    pub entries: HashMap<String, Entry>,
    /// The entries listed by the expiry index, in index order
    pub expiring: Vec<Entry>,
}

impl SnapshotData {
    /// Checks the sections against each other and rebuilds the index.
    pub fn into_parts(self) -> Result<(HashMap<String, Entry>, ExpiryIndex), SnapshotError> {
        if self.count != self.entries.len() as u64 {
            return Err(SnapshotError::Corrupt(format!(
                "count is {} but the map holds {} entries",
                self.count,
                self.entries.len()
            )));
        }

        if let Some((key, entry)) = self.entries.iter().find(|(k, e)| k.as_str() != e.key()) {
            return Err(SnapshotError::Corrupt(format!(
                "map key '{}' holds an entry for '{}'",
                key,
                entry.key()
            )));
        }

        let mut deadlines = Vec::with_capacity(self.expiring.len());
        for indexed in &self.expiring {
            let expiry = indexed.expiry().ok_or_else(|| {
                SnapshotError::Corrupt(format!("indexed key '{}' has no expiry", indexed.key()))
            })?;
            match self.entries.get(indexed.key()) {
                Some(entry) if entry.expiry() == Some(expiry) => {}
                _ => {
                    return Err(SnapshotError::Corrupt(format!(
                        "indexed key '{}' does not match the map",
                        indexed.key()
                    )))
                }
            }
            deadlines.push(Deadline::new(indexed.key(), expiry));
        }

        let index = ExpiryIndex::from_sorted(deadlines).ok_or_else(|| {
            SnapshotError::Corrupt("expiry index is unsorted or has duplicates".to_string())
        })?;

        let with_ttl = self.entries.values().filter(|e| e.expiry().is_some()).count();
        if with_ttl != index.len() {
            return Err(SnapshotError::Corrupt(format!(
                "{} entries have a TTL but the index lists {}",
                with_ttl,
                index.len()
            )));
        }

        Ok((self.entries, index))
    }
}

/// Writes `data` to `path`, replacing any previous file atomically.
pub fn write(path: &Path, data: &SnapshotData) -> Result<(), SnapshotError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        rmp_serde::encode::write(&mut writer, &data.count)?;
        rmp_serde::encode::write(&mut writer, &data.entries)?;
        rmp_serde::encode::write(&mut writer, &data.expiring)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| SnapshotError::Io(e.error))?;

    Ok(())
}

/// Reads the three sections from `path`.
pub fn read(path: &Path) -> Result<SnapshotData, SnapshotError> {
    let bytes = fs::read(path)?;
    let mut cursor = Cursor::new(bytes.as_slice());

    let data = {
        let mut de = rmp_serde::Deserializer::new(&mut cursor);
        let count = u64::deserialize(&mut de)?;
        let entries = HashMap::<String, Entry>::deserialize(&mut de)?;
        let expiring = Vec::<Entry>::deserialize(&mut de)?;
        SnapshotData {
            count,
            entries,
            expiring,
        }
    };

    let consumed = cursor.position() as usize;
    if consumed != bytes.len() {
        return Err(SnapshotError::Corrupt(format!(
            "{} trailing bytes after the index section",
            bytes.len() - consumed
        )));
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn sample() -> SnapshotData {
        let mut plain = Entry::new("plain", "1");
        let mut soon = Entry::new("soon", "2");
        let mut later = Entry::new("later", "3");
        soon.set_expiry(TimeDelta::seconds(5)).unwrap();
        later.set_expiry(TimeDelta::seconds(50)).unwrap();
        plain.value = "one".to_string();

        let expiring = vec![later.clone(), soon.clone()];
        let entries: HashMap<_, _> = [plain, soon, later]
            .into_iter()
            .map(|e| (e.key().to_string(), e))
            .collect();

        SnapshotData {
            count: 3,
            entries,
            expiring,
        }
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.snapshot");

        let data = sample();
        write(&path, &data).unwrap();

        let loaded = read(&path).unwrap();
        assert_eq!(loaded, data);

        let (entries, index) = loaded.into_parts().unwrap();
        assert_eq!(entries.len(), 3);
        let keys: Vec<_> = index.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, vec!["later", "soon"]);
    }

    #[test]
    fn test_write_replaces_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.snapshot");

        write(&path, &sample()).unwrap();
        write(&path, &SnapshotData::default()).unwrap();

        let loaded = read(&path).unwrap();
        assert_eq!(loaded.count, 0);
        assert!(loaded.entries.is_empty());

        // Only the snapshot itself is left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = read(&dir.path().join("absent"));
        assert!(matches!(result, Err(SnapshotError::Io(_))));
    }

    #[test]
    fn test_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.snapshot");
        write(&path, &sample()).unwrap();

        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        assert!(matches!(read(&path), Err(SnapshotError::Decode(_))));
    }

    #[test]
    fn test_trailing_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.snapshot");
        write(&path, &sample()).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        bytes.push(0xc0);
        fs::write(&path, &bytes).unwrap();

        assert!(matches!(read(&path), Err(SnapshotError::Corrupt(_))));
    }

    #[test]
    fn test_count_mismatch_is_corrupt() {
        let mut data = sample();
        data.count = 7;
        assert!(matches!(data.into_parts(), Err(SnapshotError::Corrupt(_))));
    }

    #[test]
    fn test_unsorted_index_is_corrupt() {
        let mut data = sample();
        data.expiring.reverse();
        assert!(matches!(data.into_parts(), Err(SnapshotError::Corrupt(_))));
    }

    #[test]
    fn test_missing_index_record_is_corrupt() {
        let mut data = sample();
        data.expiring.pop();
        assert!(matches!(data.into_parts(), Err(SnapshotError::Corrupt(_))));
    }

    #[test]
    fn test_ttl_less_entry_in_index_is_corrupt() {
        let mut data = sample();
        let plain = data.entries["plain"].clone();
        data.expiring.push(plain);
        assert!(matches!(data.into_parts(), Err(SnapshotError::Corrupt(_))));
    }
}

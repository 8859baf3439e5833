//! Ordered index of expiry deadlines.
//!
//! The index holds one [`Deadline`] for every entry that has a TTL, sorted by
//! descending expiry: the latest deadline first, the soonest one last. With
//! that order "everything expired as of now" is always a contiguous suffix,
//! so a sweep is a binary search plus a truncation instead of a scan over
//! the whole keyspace.
//!
//! ```text
//!   index:  [ t+60s | t+30s | t+5s | t-1s | t-10s ]
//!                                   ^
//!                     first i with expiry <= now
//!   sweep:  keep [..i], return [i..]
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A key and the instant it expires at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deadline {
    pub key: String,
    pub expiry: DateTime<Utc>,
}

impl Deadline {
    pub fn new(key: impl Into<String>, expiry: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            expiry,
        }
    }
}

/// Deadlines sorted by non-increasing expiry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpiryIndex {
    deadlines: Vec<Deadline>,
}

impl ExpiryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from records that are already in index order.
    ///
    /// Returns `None` if the records are not sorted or a key repeats.
    pub fn from_sorted(deadlines: Vec<Deadline>) -> Option<Self> {
        let index = Self { deadlines };
        if !index.is_sorted() {
            return None;
        }
        let mut seen = std::collections::HashSet::with_capacity(index.len());
        if !index.deadlines.iter().all(|d| seen.insert(d.key.as_str())) {
            return None;
        }
        Some(index)
    }

    /// Position of the deadline for `key`. Linear scan.
    pub fn find_by_key(&self, key: &str) -> Option<usize> {
        self.deadlines.iter().position(|d| d.key == key)
    }

    /// Removes the deadline for `key`, keeping the rest in order.
    ///
    /// Returns the removed deadline, or `None` if the key was not indexed.
    pub fn remove_by_key(&mut self, key: &str) -> Option<Deadline> {
        self.find_by_key(key).map(|i| self.deadlines.remove(i))
    }

    /// Inserts a deadline at its ordered position.
    ///
    /// The new record goes after every record with an equal or later
    /// expiry, which is where an append followed by a stable descending
    /// sort would put it.
    pub fn insert(&mut self, deadline: Deadline) {
        let pos = self
            .deadlines
            .partition_point(|d| d.expiry >= deadline.expiry);
        self.deadlines.insert(pos, deadline);
    }

    /// Splits off every deadline with `expiry <= now`.
    ///
    /// The index keeps the unexpired prefix; the expired suffix is returned
    /// so the owner can drop those keys from its map.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> Vec<Deadline> {
        let first_expired = self.deadlines.partition_point(|d| d.expiry > now);
        self.deadlines.split_off(first_expired)
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Deadline> {
        self.deadlines.iter()
    }

    /// Checks the ordering invariant.
    pub fn is_sorted(&self) -> bool {
        self.deadlines
            .windows(2)
            .all(|pair| pair[0].expiry >= pair[1].expiry)
    }

    pub fn to_vec(&self) -> Vec<Deadline> {
        self.deadlines.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn at(now: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
        now + TimeDelta::seconds(secs)
    }

    fn keys(index: &ExpiryIndex) -> Vec<&str> {
        index.iter().map(|d| d.key.as_str()).collect()
    }

    #[test]
    fn test_insert_keeps_descending_order() {
        let now = Utc::now();
        let mut index = ExpiryIndex::new();

        index.insert(Deadline::new("b", at(now, 20)));
        index.insert(Deadline::new("a", at(now, 5)));
        index.insert(Deadline::new("c", at(now, 60)));
        index.insert(Deadline::new("d", at(now, -3)));

        assert_eq!(keys(&index), vec!["c", "b", "a", "d"]);
        assert!(index.is_sorted());
    }

    #[test]
    fn test_insert_equal_expiry_goes_after_existing() {
        let now = Utc::now();
        let mut index = ExpiryIndex::new();

        index.insert(Deadline::new("first", at(now, 10)));
        index.insert(Deadline::new("second", at(now, 10)));
        index.insert(Deadline::new("later", at(now, 30)));

        assert_eq!(keys(&index), vec!["later", "first", "second"]);
    }

    #[test]
    fn test_find_and_remove_by_key() {
        let now = Utc::now();
        let mut index = ExpiryIndex::new();
        index.insert(Deadline::new("x", at(now, 3)));
        index.insert(Deadline::new("y", at(now, 2)));
        index.insert(Deadline::new("z", at(now, 1)));

        assert_eq!(index.find_by_key("y"), Some(1));
        assert_eq!(index.find_by_key("missing"), None);

        let removed = index.remove_by_key("y").unwrap();
        assert_eq!(removed.key, "y");
        assert_eq!(keys(&index), vec!["x", "z"]);

        // Removing an absent key is a no-op
        assert!(index.remove_by_key("y").is_none());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_sweep_returns_expired_suffix() {
        let now = Utc::now();
        let mut index = ExpiryIndex::new();
        index.insert(Deadline::new("stale", at(now, -10)));
        index.insert(Deadline::new("recent", at(now, -1)));
        index.insert(Deadline::new("fresh", at(now, 10)));

        let expired = index.sweep_expired(now);

        let mut expired: Vec<_> = expired.into_iter().map(|d| d.key).collect();
        expired.sort();
        assert_eq!(expired, vec!["recent", "stale"]);
        assert_eq!(keys(&index), vec!["fresh"]);
    }

    #[test]
    fn test_sweep_includes_deadline_equal_to_now() {
        let now = Utc::now();
        let mut index = ExpiryIndex::new();
        index.insert(Deadline::new("edge", now));

        assert_eq!(index.sweep_expired(now).len(), 1);
        assert!(index.is_empty());
    }

    #[test]
    fn test_sweep_with_nothing_expired() {
        let now = Utc::now();
        let mut index = ExpiryIndex::new();
        index.insert(Deadline::new("a", at(now, 1)));
        index.insert(Deadline::new("b", at(now, 2)));

        assert!(index.sweep_expired(now).is_empty());
        assert_eq!(index.len(), 2);

        let mut empty = ExpiryIndex::new();
        assert!(empty.sweep_expired(now).is_empty());
    }

    #[test]
    fn test_from_sorted_validates_input() {
        let now = Utc::now();
        let sorted = vec![Deadline::new("a", at(now, 5)), Deadline::new("b", at(now, 1))];
        assert!(ExpiryIndex::from_sorted(sorted).is_some());

        let unsorted = vec![Deadline::new("a", at(now, 1)), Deadline::new("b", at(now, 5))];
        assert!(ExpiryIndex::from_sorted(unsorted).is_none());

        let duplicate = vec![Deadline::new("a", at(now, 5)), Deadline::new("a", at(now, 1))];
        assert!(ExpiryIndex::from_sorted(duplicate).is_none());
    }
}

//! The record stored for a single key.
//!
//! An [`Entry`] pairs a value with an optional absolute expiry timestamp.
//! Expiry is kept in UTC wall-clock time (not `Instant`) because it has to
//! survive a snapshot and be meaningful again after a restart.

use crate::storage::StoreError;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// A stored value with its key and optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// The key this entry is stored under. Never changes after creation.
    key: String,
    /// The actual value stored
    pub value: String,
    /// When this entry expires (None = never expires)
    expiry: Option<DateTime<Utc>>,
}

impl Entry {
    /// Creates a new entry without expiry.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            expiry: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The absolute expiry instant, if one is set.
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    /// Sets the expiry to `now + ttl` and returns the new deadline.
    ///
    /// The sign of `ttl` is not checked: a zero or negative TTL yields a
    /// deadline that has already passed, and the entry is removed by the
    /// next sweep. Fails only when the deadline is not representable, in
    /// which case the entry is left untouched.
    pub fn set_expiry(&mut self, ttl: TimeDelta) -> Result<DateTime<Utc>, StoreError> {
        let deadline = deadline_after(Utc::now(), ttl)?;
        self.expiry = Some(deadline);
        Ok(deadline)
    }

    /// Time left until expiry, or `None` if the entry never expires.
    ///
    /// The result is negative when the deadline has passed but the entry
    /// has not been swept yet.
    pub fn remaining_ttl(&self) -> Option<TimeDelta> {
        self.expiry.map(|exp| exp - Utc::now())
    }

    /// Checks whether this entry has expired as of `now`.
    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry.map(|exp| exp <= now).unwrap_or(false)
    }
}

/// Computes `now + ttl`, rejecting results outside chrono's range.
pub(crate) fn deadline_after(
    now: DateTime<Utc>,
    ttl: TimeDelta,
) -> Result<DateTime<Utc>, StoreError> {
    now.checked_add_signed(ttl)
        .ok_or_else(|| StoreError::InvalidArgument(format!("ttl {ttl} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_has_no_expiry() {
        let entry = Entry::new("name", "Ariz");
        assert_eq!(entry.key(), "name");
        assert_eq!(entry.value, "Ariz");
        assert_eq!(entry.expiry(), None);
        assert_eq!(entry.remaining_ttl(), None);
        assert!(!entry.is_expired_at(Utc::now()));
    }

    #[test]
    fn test_set_expiry_in_future() {
        let mut entry = Entry::new("session", "token");
        let before = Utc::now();
        let deadline = entry.set_expiry(TimeDelta::seconds(60)).unwrap();

        assert_eq!(entry.expiry(), Some(deadline));
        assert!(deadline > before);

        let remaining = entry.remaining_ttl().unwrap();
        assert!(remaining > TimeDelta::zero());
        assert!(remaining <= TimeDelta::seconds(60));
        assert!(!entry.is_expired_at(Utc::now()));
    }

    #[test]
    fn test_negative_ttl_is_already_expired() {
        let mut entry = Entry::new("old", "value");
        entry.set_expiry(TimeDelta::seconds(-5)).unwrap();

        assert!(entry.is_expired_at(Utc::now()));
        assert!(entry.remaining_ttl().unwrap() < TimeDelta::zero());
    }

    #[test]
    fn test_overflowing_ttl_is_rejected() {
        let mut entry = Entry::new("key", "value");
        let result = entry.set_expiry(TimeDelta::MAX);

        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
        assert_eq!(entry.expiry(), None);
    }
}

//! crates/pickup_core/src/ledger.rs
//!
//! The slot capacity ledger: one counter per calendar day and slot start minute,
//! and the "reserve one unit if capacity remains" rule.
//!
//! The rule itself is pure. Atomicity is the store's job: an adapter must load the
//! counter under a lock (or inside a serializable transaction), call
//! [`SlotCounter::reserve`], and persist the result in the same commit as the order.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;

/// Ledger key. Combines the date and the start minute, never the display label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SlotKey {
    pub pickup_date: NaiveDate,
    pub start_minute: u32,
}

impl SlotKey {
    pub fn new(pickup_date: NaiveDate, start_minute: u32) -> Self {
        Self {
            pickup_date,
            start_minute,
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.pickup_date.format("%Y-%m-%d"), self.start_minute)
    }
}

/// Persisted reservation count for one slot on one day.
///
/// `count` only ever grows, one step per admitted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotCounter {
    pub pickup_date: NaiveDate,
    pub pickup_start_minute: u32,
    pub label: String,
    pub count: u32,
    pub updated_at: DateTime<Utc>,
}

/// Returned when a slot has no capacity left. Carries no partial write.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("slot {key} is full ({count}/{limit})")]
pub struct SlotFull {
    pub key: SlotKey,
    pub count: u32,
    pub limit: u32,
}

/// A granted reservation and the counter value after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reserved {
    pub key: SlotKey,
    pub count: u32,
}

impl SlotCounter {
    /// A counter that has not seen any reservation yet.
    pub fn empty(key: SlotKey, label: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            pickup_date: key.pickup_date,
            pickup_start_minute: key.start_minute,
            label: label.into(),
            count: 0,
            updated_at: now,
        }
    }

    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.pickup_date, self.pickup_start_minute)
    }

    /// Takes one unit if `count < limit`. On failure the counter is left untouched.
    pub fn reserve(&mut self, limit: u32, now: DateTime<Utc>) -> Result<Reserved, SlotFull> {
        if self.count >= limit {
            return Err(SlotFull {
                key: self.key(),
                count: self.count,
                limit,
            });
        }
        self.count += 1;
        self.updated_at = now;
        Ok(Reserved {
            key: self.key(),
            count: self.count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key() -> SlotKey {
        SlotKey::new(NaiveDate::from_ymd_opt(2024, 5, 17).unwrap(), 630)
    }

    #[test]
    fn key_formats_date_and_minute() {
        assert_eq!(key().to_string(), "2024-05-17_630");
    }

    #[test]
    fn reserve_stops_at_limit() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 17, 8, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 5, 17, 8, 1, 0).unwrap();
        let mut counter = SlotCounter::empty(key(), "10:30 - 10:45", t0);

        assert_eq!(counter.reserve(2, t1).unwrap().count, 1);
        assert_eq!(counter.reserve(2, t1).unwrap().count, 2);

        let full = counter.reserve(2, t1).unwrap_err();
        assert_eq!(full.count, 2);
        assert_eq!(full.limit, 2);
        assert_eq!(counter.count, 2);
        assert_eq!(counter.updated_at, t1);
    }

    #[test]
    fn zero_limit_never_reserves() {
        let now = Utc.with_ymd_and_hms(2024, 5, 17, 8, 0, 0).unwrap();
        let mut counter = SlotCounter::empty(key(), "10:30 - 10:45", now);
        assert!(counter.reserve(0, now).is_err());
        assert_eq!(counter.count, 0);
    }
}

//! Vector clock for causal bookkeeping.
//!
//! Each origin owns one entry: the highest operation `version` seen from it.
//! The local node advances its own entry with [`VectorClock::record_local`];
//! remote progress is folded in with [`VectorClock::observe`] (per operation)
//! or [`VectorClock::merge`] (whole clock).
//!
//! # Examples
//!
//! ```
//! use meridian_crdt::VectorClock;
//!
//! let mut a = VectorClock::new();
//! assert_eq!(a.record_local("node-a"), 1);
//! assert_eq!(a.record_local("node-a"), 2);
//!
//! let mut b = VectorClock::new();
//! b.observe("node-b", 4);
//! assert!(a.concurrent_with(&b));
//!
//! a.merge(&b);
//! assert_eq!(a.get("node-a"), 2);
//! assert_eq!(a.get("node-b"), 4);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Origin id → highest observed version.
///
/// Serialized as a plain mapping so it matches the snapshot record layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    clocks: BTreeMap<String, u64>,
}

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the entry for `origin` and return the new version.
    pub fn record_local(&mut self, origin: &str) -> u64 {
        let entry = self.clocks.entry(origin.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Raise the entry for `origin` to at least `version`. Never lowers it,
    /// and never stores a zero entry.
    pub fn observe(&mut self, origin: &str, version: u64) {
        if version > self.get(origin) {
            self.clocks.insert(origin.to_string(), version);
        }
    }

    /// Current value for `origin` (0 if absent).
    pub fn get(&self, origin: &str) -> u64 {
        self.clocks.get(origin).copied().unwrap_or(0)
    }

    /// Component-wise max.
    pub fn merge(&mut self, other: &Self) {
        for (origin, &version) in &other.clocks {
            self.observe(origin, version);
        }
    }

    /// True if every entry of `self` is ≤ the matching entry of `other` and
    /// at least one is strictly less.
    pub fn happens_before(&self, other: &Self) -> bool {
        let mut strictly_less = false;
        for origin in self.clocks.keys().chain(other.clocks.keys()) {
            let (mine, theirs) = (self.get(origin), other.get(origin));
            if mine > theirs {
                return false;
            }
            if mine < theirs {
                strictly_less = true;
            }
        }
        strictly_less
    }

    /// Neither clock happens-before the other and they differ.
    pub fn concurrent_with(&self, other: &Self) -> bool {
        !self.happens_before(other) && !other.happens_before(self) && !self.equivalent(other)
    }

    /// `other` happens-before `self`.
    pub fn dominates(&self, other: &Self) -> bool {
        other.happens_before(self)
    }

    pub fn agents(&self) -> impl Iterator<Item = &str> {
        self.clocks.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.clocks.iter().map(|(origin, &version)| (origin.as_str(), version))
    }

    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }

    // Zero entries and missing entries compare equal.
    fn equivalent(&self, other: &Self) -> bool {
        self.clocks
            .keys()
            .chain(other.clocks.keys())
            .all(|origin| self.get(origin) == other.get(origin))
    }
}

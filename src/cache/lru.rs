//! LRU Tracker Module
//!
//! Implements Least Recently Used tracking for cache eviction.

use std::collections::{BTreeSet, HashMap};

/// Ordering key: oldest `last_accessed` first, ties broken by earliest
/// `created_at`, then by key so the order is total.
type RecencyKey = (u64, u64, String);

// == LRU Tracker ==
/// Tracks access recency for LRU eviction.
///
/// Keys are kept in a `BTreeSet` ordered by `(last_accessed, created_at, key)`,
/// so the first element is always the exact least recently used entry.
#[derive(Debug, Default)]
pub struct LruTracker {
    /// Keys ordered by recency
    order: BTreeSet<RecencyKey>,
    /// Current `(last_accessed, created_at)` of every tracked key
    positions: HashMap<String, (u64, u64)>,
}

impl LruTracker {
    // == Constructor ==
    /// Creates a new empty LRU tracker.
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Records the current recency of a key, inserting it if new.
    pub fn touch(&mut self, key: &str, last_accessed: u64, created_at: u64) {
        if let Some(previous) = self
            .positions
            .insert(key.to_string(), (last_accessed, created_at))
        {
            self.order.remove(&(previous.0, previous.1, key.to_string()));
        }
        self.order
            .insert((last_accessed, created_at, key.to_string()));
    }

    // == Remove ==
    /// Removes a key from the tracker.
    pub fn remove(&mut self, key: &str) {
        if let Some((last_accessed, created_at)) = self.positions.remove(key) {
            self.order.remove(&(last_accessed, created_at, key.to_string()));
        }
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    pub fn peek_oldest(&self) -> Option<&str> {
        self.order.iter().next().map(|(_, _, key)| key.as_str())
    }

    /// Returns the least recently used key other than `protected`.
    pub fn oldest_except(&self, protected: &str) -> Option<&str> {
        self.order
            .iter()
            .map(|(_, _, key)| key.as_str())
            .find(|key| *key != protected)
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.positions.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.positions.clear();
    }
}

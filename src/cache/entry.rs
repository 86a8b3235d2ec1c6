//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

// == Cache Entry ==
/// Represents a single cache entry with payload and metadata.
///
/// The key lives in the store's map, not on the entry.
#[derive(Debug)]
pub struct CacheEntry<V> {
    /// The stored payload, shared with readers
    pub payload: Arc<V>,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Lifetime in milliseconds, measured from `created_at`
    pub ttl_ms: u64,
    /// Group labels for bulk invalidation
    pub tags: BTreeSet<String>,
    /// Number of successful reads
    pub access_count: u64,
    /// Last successful read (Unix milliseconds), never before `created_at`
    pub last_accessed: u64,
    /// Whether the entry is mirrored to durable storage
    pub persistent: bool,
    /// Size charged against the memory budget
    pub size_bytes: usize,
    /// JSON form of the payload, present only for mirrorable entries.
    /// Shared with queued snapshots so a rewrite never deep-copies it.
    pub encoded: Option<Arc<Value>>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry stamped at `now`.
    pub fn new(payload: Arc<V>, now: u64, ttl_ms: u64, size_bytes: usize) -> Self {
        Self {
            payload,
            created_at: now,
            ttl_ms,
            tags: BTreeSet::new(),
            access_count: 0,
            last_accessed: now,
            persistent: false,
            size_bytes,
            encoded: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_persistence(mut self, persistent: bool, encoded: Option<Value>) -> Self {
        self.persistent = persistent;
        self.encoded = encoded.map(Arc::new);
        self
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// Boundary condition: the entry is still live when exactly `ttl_ms` has
    /// elapsed and expired one millisecond later.
    pub fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.created_at) > self.ttl_ms
    }

    // == Record Access ==
    /// Marks a successful read.
    pub fn record_access(&mut self, now: u64) {
        self.access_count += 1;
        self.last_accessed = now.max(self.created_at);
    }

    /// True when the entry should be written to the mirror.
    pub fn is_mirrorable(&self) -> bool {
        self.persistent && self.encoded.is_some()
    }
}

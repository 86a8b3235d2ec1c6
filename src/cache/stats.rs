//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, and evictions.
//! Counters are atomics and the store's shape sits behind its own small lock,
//! so `stats()` never waits on the store lock.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

// == Cache Stats ==
/// Read-only snapshot of cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Current number of live entries
    pub size: usize,
    /// Bytes currently charged against the budget
    pub memory_usage: usize,
    /// Configured memory budget in bytes
    pub memory_budget: usize,
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found or expired)
    pub misses: u64,
    /// Number of admitted sets
    pub sets: u64,
    /// Number of explicit deletes that removed an entry
    pub deletes: u64,
    /// Number of entries evicted due to LRU policy
    pub evictions: u64,
    /// Number of entries removed because their TTL elapsed
    pub expirations: u64,
    /// hits / (hits + misses), 0 when there were no reads
    pub hit_rate: f64,
    /// Creation time of the oldest live entry
    pub oldest_entry_timestamp: Option<u64>,
    /// Creation time of the newest live entry
    pub newest_entry_timestamp: Option<u64>,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn compute_hit_rate(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Shape of the store as of its last mutation.
#[derive(Debug, Default, Clone, Copy)]
struct Gauges {
    entries: usize,
    memory_usage: usize,
    created_range: Option<(u64, u64)>,
}

// == Stats Collector ==
/// Monotonic counters plus gauges published by the store after each mutation.
#[derive(Debug, Default)]
pub struct StatsCollector {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    /// Published as one value, so size and timestamps always agree
    gauges: Mutex<Gauges>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_expirations(&self, count: usize) {
        self.expirations.fetch_add(count as u64, Ordering::Relaxed);
    }

    // == Publish Gauges ==
    /// Replaces the published store shape in one step.
    pub fn publish(&self, entries: usize, memory_usage: usize, created_range: Option<(u64, u64)>) {
        *self.gauges.lock() = Gauges {
            entries,
            memory_usage,
            created_range: created_range.filter(|_| entries > 0),
        };
    }

    // == Reset ==
    /// Zeroes every counter. Only `clear()` calls this.
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.sets,
            &self.deletes,
            &self.evictions,
            &self.expirations,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.publish(0, 0, None);
    }

    // == Snapshot ==
    pub fn snapshot(&self, memory_budget: usize) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let gauges = *self.gauges.lock();

        CacheStats {
            size: gauges.entries,
            memory_usage: gauges.memory_usage,
            memory_budget,
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            hit_rate: CacheStats::compute_hit_rate(hits, misses),
            oldest_entry_timestamp: gauges.created_range.map(|(oldest, _)| oldest),
            newest_entry_timestamp: gauges.created_range.map(|(_, newest)| newest),
        }
    }
}

//! Cache Store Module
//!
//! Main cache engine combining HashMap storage with LRU tracking, the tag
//! index, TTL expiration and memory-budget admission. Everything that must
//! stay mutually consistent (entries, recency, tags, memory usage) lives in
//! this one struct so a single lock protects it.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::{CacheEntry, LruTracker, TagIndex, MAX_KEY_LENGTH};
use crate::config::Config;
use crate::error::{CacheError, Result};

// == Limits ==
/// Byte limits derived from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Hard bound on total entry size
    pub budget: usize,
    /// Usage above which the soft eviction pass runs
    pub high_watermark: usize,
    /// Largest admissible single entry
    pub max_entry: usize,
    /// Soft cap on evictions per admission
    pub max_evictions: usize,
}

impl Limits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            budget: config.memory_budget,
            high_watermark: config.high_watermark_bytes(),
            max_entry: config.max_entry_bytes(),
            max_evictions: config.max_evictions_per_admission,
        }
    }
}

/// An entry removed from the store, as far as the mirror cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removed {
    pub key: String,
    pub persistent: bool,
}

/// What happened during a successful admission.
#[derive(Debug, Default)]
pub struct Admission {
    /// The key already held an entry that was replaced
    pub replaced: Option<Removed>,
    /// Entries evicted to make room
    pub evicted: Vec<Removed>,
}

/// Result of a read.
#[derive(Debug)]
pub enum Lookup<V> {
    Hit(Arc<V>),
    Missing,
    /// The entry had expired and was removed on the spot.
    Expired(Removed),
}

// == Cache Store ==
/// Main cache storage with LRU eviction, tags and TTL support.
#[derive(Debug)]
pub struct CacheStore<V> {
    /// Key-entry storage
    entries: HashMap<String, CacheEntry<V>>,
    /// LRU access tracker
    lru: LruTracker,
    /// Tag to keys index
    tags: TagIndex,
    /// Keys ordered by creation time, for oldest/newest reporting
    created: BTreeSet<(u64, String)>,
    /// Sum of `size_bytes` over all entries
    memory_usage: usize,
    limits: Limits,
}

impl<V> CacheStore<V> {
    // == Constructor ==
    pub fn new(limits: Limits) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            tags: TagIndex::new(),
            created: BTreeSet::new(),
            memory_usage: 0,
            limits,
        }
    }

    // == Admit ==
    /// Inserts or replaces an entry, then evicts LRU entries if the store is
    /// over its high watermark.
    ///
    /// An entry larger than `max_entry` is rejected and nothing changes. The
    /// admitted entry itself is never picked as an eviction victim.
    pub fn admit(&mut self, key: String, entry: CacheEntry<V>) -> Result<Admission> {
        validate_key(&key)?;

        if entry.size_bytes > self.limits.max_entry {
            warn!(
                key = %key,
                size_bytes = entry.size_bytes,
                limit_bytes = self.limits.max_entry,
                "Rejecting oversized cache entry"
            );
            return Err(CacheError::CapacityRejected {
                key,
                size_bytes: entry.size_bytes,
                limit_bytes: self.limits.max_entry,
            });
        }

        let replaced = self.remove(&key).map(|old| Removed {
            key: key.clone(),
            persistent: old.persistent,
        });

        self.insert_unchecked(key.clone(), entry);
        let evicted = self.evict_over_watermark(Some(&key));

        Ok(Admission { replaced, evicted })
    }

    // == Restore ==
    /// Inserts an entry loaded from the mirror if it fits the budget as-is.
    ///
    /// Never evicts to make room; returns false when the entry was dropped.
    pub fn restore(&mut self, key: String, entry: CacheEntry<V>) -> bool {
        if validate_key(&key).is_err()
            || self.entries.contains_key(&key)
            || entry.size_bytes > self.limits.max_entry
            || self.memory_usage + entry.size_bytes > self.limits.budget
        {
            return false;
        }
        self.insert_unchecked(key, entry);
        true
    }

    fn insert_unchecked(&mut self, key: String, entry: CacheEntry<V>) {
        self.memory_usage += entry.size_bytes;
        self.lru.touch(&key, entry.last_accessed, entry.created_at);
        self.tags.insert(&key, &entry.tags);
        self.created.insert((entry.created_at, key.clone()));
        self.entries.insert(key, entry);
    }

    // == Get ==
    /// Retrieves a payload by key, recording the access.
    ///
    /// Expired entries are removed and reported so the caller can count a miss.
    pub fn get(&mut self, key: &str, now: u64) -> Lookup<V> {
        match self.entries.get_mut(key) {
            None => return Lookup::Missing,
            Some(entry) if !entry.is_expired(now) => {
                entry.record_access(now);
                let payload = Arc::clone(&entry.payload);
                let (last_accessed, created_at) = (entry.last_accessed, entry.created_at);
                self.lru.touch(key, last_accessed, created_at);
                return Lookup::Hit(payload);
            }
            Some(_) => {}
        }
        self.remove_as_expired(key)
    }

    // == Contains ==
    /// Like `get` without touching access statistics or recency.
    pub fn contains(&mut self, key: &str, now: u64) -> Lookup<V> {
        match self.entries.get(key) {
            None => Lookup::Missing,
            Some(entry) if !entry.is_expired(now) => Lookup::Hit(Arc::clone(&entry.payload)),
            Some(_) => self.remove_as_expired(key),
        }
    }

    fn remove_as_expired(&mut self, key: &str) -> Lookup<V> {
        match self.remove(key) {
            Some(entry) => Lookup::Expired(Removed {
                key: key.to_string(),
                persistent: entry.persistent,
            }),
            None => Lookup::Missing,
        }
    }

    /// Read-only access to an entry's metadata.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    // == Remove ==
    /// Removes an entry by key along with its index records.
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.memory_usage -= entry.size_bytes;
        self.lru.remove(key);
        self.tags.remove(key, &entry.tags);
        self.created.remove(&(entry.created_at, key.to_string()));
        Some(entry)
    }

    // == Invalidate Tag ==
    /// Removes every entry carrying `tag`.
    ///
    /// Returns `(live, expired)`: entries that were still live, and entries
    /// that had already expired and are removed without being counted.
    pub fn invalidate_tag(&mut self, tag: &str, now: u64) -> (Vec<Removed>, Vec<Removed>) {
        let mut live = Vec::new();
        let mut expired = Vec::new();

        for key in self.tags.keys_for(tag) {
            if let Some(entry) = self.remove(&key) {
                let removed = Removed {
                    key,
                    persistent: entry.persistent,
                };
                if entry.is_expired(now) {
                    expired.push(removed);
                } else {
                    live.push(removed);
                }
            }
        }

        (live, expired)
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    pub fn remove_expired(&mut self, now: u64) -> Vec<Removed> {
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        expired_keys
            .into_iter()
            .filter_map(|key| {
                self.remove(&key).map(|entry| Removed {
                    key,
                    persistent: entry.persistent,
                })
            })
            .collect()
    }

    // == Evict ==
    /// Evicts least recently used entries while usage is above the high
    /// watermark, at most `max_evictions` of them. Past that cap eviction only
    /// continues while usage exceeds the hard budget.
    pub fn evict_over_watermark(&mut self, protected: Option<&str>) -> Vec<Removed> {
        self.evict(protected, self.limits.max_evictions)
    }

    /// Evicts until usage is at or below the high watermark, with no cap.
    pub fn enforce_watermark(&mut self) -> Vec<Removed> {
        self.evict(None, usize::MAX)
    }

    fn evict(&mut self, protected: Option<&str>, cap: usize) -> Vec<Removed> {
        let mut evicted = Vec::new();

        loop {
            let over_watermark =
                self.memory_usage > self.limits.high_watermark && evicted.len() < cap;
            let over_budget = self.memory_usage > self.limits.budget;
            if !over_watermark && !over_budget {
                break;
            }

            let victim = match protected {
                Some(protected) => self.lru.oldest_except(protected),
                None => self.lru.peek_oldest(),
            }
            .map(str::to_string);

            let Some(victim) = victim else { break };
            if let Some(entry) = self.remove(&victim) {
                debug!(
                    key = %victim,
                    last_accessed = entry.last_accessed,
                    size_bytes = entry.size_bytes,
                    "Evicted least recently used entry"
                );
                evicted.push(Removed {
                    key: victim,
                    persistent: entry.persistent,
                });
            }
        }

        evicted
    }

    // == Clear ==
    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.tags.clear();
        self.created.clear();
        self.memory_usage = 0;
    }

    /// Entries that belong in the durable mirror.
    pub fn mirrorable(&self) -> impl Iterator<Item = (&String, &CacheEntry<V>)> {
        self.entries.iter().filter(|(_, entry)| entry.is_mirrorable())
    }

    /// Creation times of the oldest and newest entries.
    pub fn created_range(&self) -> Option<(u64, u64)> {
        let oldest = self.created.first()?.0;
        let newest = self.created.last()?.0;
        Some((oldest, newest))
    }

    pub fn memory_usage(&self) -> usize {
        self.memory_usage
    }

    // == Length ==
    /// Returns the current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidRequest("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidRequest(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

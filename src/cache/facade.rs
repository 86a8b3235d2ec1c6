//! Cache Facade Module
//!
//! `Cache<V>` is the handle callers hold. It owns the single store lock, the
//! statistics, the clock, and (when opened with storage) the
//! durable mirror. Handles are cheap to clone and share one cache.

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use crate::cache::store::{CacheStore, Limits, Lookup};
use crate::cache::{duration_ms, CacheEntry, CacheStats, Clock, StatsCollector, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::persist::{DurableStorage, Mirror};
use crate::tasks::TaskHandle;

/// Computes the size charged for a payload.
pub type Weigher<V> = Arc<dyn Fn(&V) -> usize + Send + Sync>;

// == Set Options ==
/// Per-entry options for `Cache::set`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Lifetime of the entry; the configured default when `None`
    pub ttl: Option<Duration>,
    /// Labels for bulk invalidation
    pub tags: Vec<String>,
    /// Mirror the entry to durable storage
    pub persistent: bool,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn ttl_ms(self, ttl_ms: u64) -> Self {
        self.ttl(Duration::from_millis(ttl_ms))
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }
}

// == Shared State ==
pub(crate) struct Inner<V> {
    pub(crate) config: Config,
    pub(crate) store: Mutex<CacheStore<V>>,
    pub(crate) stats: StatsCollector,
    pub(crate) clock: Arc<dyn Clock>,
    weigher: Weigher<V>,
    pub(crate) mirror: Option<Mirror<V>>,
    /// Set while a sweep is running
    pub(crate) sweeping: AtomicBool,
    /// Periodic sweep registration; dropping it cancels the timer
    pub(crate) sweeper: Mutex<Option<TaskHandle>>,
}

// == Cache ==
/// In-process cache with TTL, tags, LRU memory budgeting and an optional
/// durable mirror.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use tiercache::{Cache, Config, SetOptions};
///
/// let cache: Cache<String> = Cache::new(Config::default()).unwrap();
/// cache
///     .set("user:1", "alice".to_string(), SetOptions::new().ttl(Duration::from_secs(60)).tag("users"))
///     .unwrap();
/// assert_eq!(cache.get("user:1").as_deref().map(String::as_str), Some("alice"));
/// assert_eq!(cache.invalidate_tag("users"), 1);
/// ```
pub struct Cache<V> {
    pub(crate) inner: Arc<Inner<V>>,
}

impl<V> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("config", &self.inner.config)
            .field("mirrored", &self.inner.mirror.is_some())
            .finish_non_exhaustive()
    }
}

// == Builder ==
pub struct CacheBuilder<V> {
    config: Config,
    clock: Arc<dyn Clock>,
    weigher: Option<Weigher<V>>,
}

impl<V: Send + Sync + 'static> CacheBuilder<V> {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            weigher: None,
        }
    }

    /// Replaces the system clock, typically with a `ManualClock` in tests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets how entry sizes are computed.
    pub fn weigher(mut self, weigher: impl Fn(&V) -> usize + Send + Sync + 'static) -> Self {
        self.weigher = Some(Arc::new(weigher));
        self
    }

    // == Build ==
    /// Builds a memory-only cache.
    ///
    /// Without a custom weigher every entry is charged `size_of::<V>()`.
    pub fn build(self) -> Result<Cache<V>> {
        self.config.validate()?;
        let weigher: Weigher<V> = match self.weigher {
            Some(weigher) => weigher,
            None => Arc::new(|_: &V| std::mem::size_of::<V>()),
        };
        Ok(Cache::assemble(self.config, self.clock, weigher, None))
    }
}

impl<V: Serialize + DeserializeOwned + Send + Sync + 'static> CacheBuilder<V> {
    // == Open ==
    /// Builds a cache mirrored to `storage` and reloads any snapshot found
    /// there.
    ///
    /// Storage problems never fail this call; the cache then starts empty and
    /// keeps retrying the mirror on later writes. Without a custom weigher
    /// entries are charged their serialized JSON length. Must be called from
    /// within a tokio runtime.
    pub async fn open(self, storage: Arc<dyn DurableStorage>) -> Result<Cache<V>> {
        self.config.validate()?;
        let weigher: Weigher<V> = match self.weigher {
            Some(weigher) => weigher,
            None => Arc::new(json_weight::<V>),
        };

        let mirror = Mirror::spawn(storage);
        let restored = mirror.load(self.clock.now_ms(), &*weigher).await;

        let cache = Cache::assemble(self.config, self.clock, weigher, Some(mirror));
        cache.restore(restored);
        Ok(cache)
    }
}

/// Serialized JSON length of a payload, falling back to its in-memory size.
pub fn json_weight<V: Serialize>(value: &V) -> usize {
    serde_json::to_vec(value)
        .map(|bytes| bytes.len())
        .unwrap_or(std::mem::size_of::<V>())
}

impl<V: Send + Sync + 'static> Cache<V> {
    pub fn builder(config: Config) -> CacheBuilder<V> {
        CacheBuilder::new(config)
    }

    /// Memory-only cache on the system clock.
    pub fn new(config: Config) -> Result<Self> {
        CacheBuilder::new(config).build()
    }

    fn assemble(
        config: Config,
        clock: Arc<dyn Clock>,
        weigher: Weigher<V>,
        mirror: Option<Mirror<V>>,
    ) -> Self {
        let store = CacheStore::new(Limits::from_config(&config));
        Self {
            inner: Arc::new(Inner {
                config,
                store: Mutex::new(store),
                stats: StatsCollector::new(),
                clock,
                weigher,
                mirror,
                sweeping: AtomicBool::new(false),
                sweeper: Mutex::new(None),
            }),
        }
    }

    fn restore(&self, restored: Vec<(String, CacheEntry<V>)>) {
        let offered = restored.len();
        let mut store = self.inner.store.lock();
        let admitted = restored
            .into_iter()
            .map(|(key, entry)| store.restore(key, entry))
            .filter(|admitted| *admitted)
            .count();
        self.publish(&store);
        drop(store);

        if offered > 0 {
            info!(
                admitted,
                dropped = offered - admitted,
                "Restored persistent entries from mirror"
            );
        }
    }

    // == Set ==
    /// Stores a payload under `key`, replacing any previous entry.
    ///
    /// Fails only for an invalid key or with `CapacityRejected` when the
    /// payload alone is larger than the per-entry limit; in both cases the
    /// cache is unchanged. Persistence problems are logged, never returned.
    pub fn set(&self, key: impl Into<String>, value: V, options: SetOptions) -> Result<()> {
        self.insert(key.into(), Arc::new(value), options)
    }

    fn insert(&self, key: String, payload: Arc<V>, options: SetOptions) -> Result<()> {
        let inner = &*self.inner;
        let ttl_ms = duration_ms(options.ttl.unwrap_or_else(|| inner.config.default_ttl()));
        let size_bytes = (inner.weigher)(&*payload);
        let encoded = match (&inner.mirror, options.persistent) {
            (Some(mirror), true) => mirror.encode(&key, &*payload),
            _ => None,
        };

        let entry = CacheEntry::new(payload, inner.clock.now_ms(), ttl_ms, size_bytes)
            .with_tags(options.tags)
            .with_persistence(options.persistent, encoded);
        let mirror_new = entry.is_mirrorable() && inner.config.mirror_on_set;

        let mut store = inner.store.lock();
        let admission = store.admit(key.clone(), entry)?;
        inner.stats.record_set();
        inner.stats.record_evictions(admission.evicted.len());

        let dropped_persistent = admission
            .replaced
            .iter()
            .chain(&admission.evicted)
            .any(|removed| removed.persistent);
        if mirror_new || dropped_persistent {
            self.rewrite_mirror(&store);
        }
        self.publish(&store);
        drop(store);

        debug!(
            key = %key,
            size_bytes,
            ttl_ms,
            evicted = admission.evicted.len(),
            "Cache set"
        );
        Ok(())
    }

    // == Get ==
    /// Returns the payload for `key` if present and not expired.
    ///
    /// The payload is shared with the cache and any other reader.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let now = self.inner.clock.now_ms();
        let mut store = self.inner.store.lock();
        match store.get(key, now) {
            Lookup::Hit(payload) => {
                self.inner.stats.record_hit();
                Some(payload)
            }
            Lookup::Missing => {
                self.inner.stats.record_miss();
                None
            }
            Lookup::Expired(_) => {
                self.inner.stats.record_miss();
                self.inner.stats.record_expirations(1);
                self.publish(&store);
                debug!(key = %key, "Entry expired on read");
                None
            }
        }
    }

    // == Has ==
    /// Whether `key` holds a live entry. Does not count as a read.
    pub fn has(&self, key: &str) -> bool {
        let now = self.inner.clock.now_ms();
        let mut store = self.inner.store.lock();
        match store.contains(key, now) {
            Lookup::Hit(_) => true,
            Lookup::Missing => false,
            Lookup::Expired(_) => {
                self.inner.stats.record_expirations(1);
                self.publish(&store);
                false
            }
        }
    }

    // == Delete ==
    /// Removes `key` from memory and, if persistent, from the mirror.
    /// Returns whether an entry was present.
    pub fn delete(&self, key: &str) -> bool {
        let mut store = self.inner.store.lock();
        let Some(entry) = store.remove(key) else {
            return false;
        };
        self.inner.stats.record_delete();
        if entry.persistent {
            self.rewrite_mirror(&store);
        }
        self.publish(&store);
        debug!(key = %key, "Cache delete");
        true
    }

    // == Invalidate Tag ==
    /// Removes every entry tagged `tag` and returns how many live entries
    /// were removed. A repeated call returns 0.
    pub fn invalidate_tag(&self, tag: &str) -> usize {
        let now = self.inner.clock.now_ms();
        let mut store = self.inner.store.lock();
        let (live, expired) = store.invalidate_tag(tag, now);
        if live.is_empty() && expired.is_empty() {
            return 0;
        }

        self.inner.stats.record_expirations(expired.len());
        if live.iter().chain(&expired).any(|removed| removed.persistent) {
            self.rewrite_mirror(&store);
        }
        self.publish(&store);
        drop(store);

        debug!(tag = %tag, removed = live.len(), "Tag invalidated");
        live.len()
    }

    // == Clear ==
    /// Empties both tiers and resets every statistics counter.
    pub fn clear(&self) {
        let mut store = self.inner.store.lock();
        store.clear();
        self.inner.stats.reset();
        if let Some(mirror) = &self.inner.mirror {
            mirror.schedule_remove();
        }
        drop(store);
        info!("Cache cleared");
    }

    // == Stats ==
    /// Snapshot of the statistics. Never waits on the store lock.
    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot(self.inner.config.memory_budget)
    }

    // == Memoization ==
    /// Returns the cached payload for `key`, or computes, stores and returns
    /// it. A computed value that cannot be stored is still returned.
    pub fn get_or_insert_with<F>(&self, key: &str, options: SetOptions, compute: F) -> Arc<V>
    where
        F: FnOnce() -> V,
    {
        if let Some(hit) = self.get(key) {
            return hit;
        }
        let payload = Arc::new(compute());
        if let Err(e) = self.insert(key.to_string(), Arc::clone(&payload), options) {
            debug!(key = %key, error = %e, "Computed value not cached");
        }
        payload
    }

    /// Fallible form of `get_or_insert_with`; errors are returned and never
    /// cached.
    pub fn try_get_or_insert_with<F, E>(
        &self,
        key: &str,
        options: SetOptions,
        compute: F,
    ) -> std::result::Result<Arc<V>, E>
    where
        F: FnOnce() -> std::result::Result<V, E>,
    {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }
        let payload = Arc::new(compute()?);
        if let Err(e) = self.insert(key.to_string(), Arc::clone(&payload), options) {
            debug!(key = %key, error = %e, "Computed value not cached");
        }
        Ok(payload)
    }

    // == Lifecycle ==
    /// Cancels the periodic sweeper. Safe to call more than once.
    pub fn destroy(&self) {
        let handle = self.inner.sweeper.lock().take();
        if let Some(handle) = handle {
            handle.cancel();
            info!("Sweeper cancelled");
        }
    }

    /// Waits until queued mirror writes have been attempted.
    pub async fn flush(&self) {
        if let Some(mirror) = &self.inner.mirror {
            mirror.flush().await;
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn is_mirrored(&self) -> bool {
        self.inner.mirror.is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.lock().is_empty()
    }

    // == Internal ==
    /// Queues a full mirror rewrite; returns the number of entries written.
    pub(crate) fn rewrite_mirror(&self, store: &CacheStore<V>) -> usize {
        match &self.inner.mirror {
            Some(mirror) => mirror.schedule_rewrite(store.mirrorable()),
            None => 0,
        }
    }

    pub(crate) fn publish(&self, store: &CacheStore<V>) {
        self.inner
            .stats
            .publish(store.len(), store.memory_usage(), store.created_range());
    }
}

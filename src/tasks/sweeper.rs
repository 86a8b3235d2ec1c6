//! Expiry Sweeper
//!
//! Periodic maintenance pass over a cache: drops expired entries, brings
//! memory usage back under the high watermark and rewrites the durable
//! mirror from what is left.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::cache::Cache;
use crate::tasks::{Scheduler, Tick};

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Expired entries removed
    pub expired: usize,
    /// Entries evicted to get under the high watermark
    pub evicted: usize,
    /// Entries in the rewritten mirror snapshot
    pub persisted: usize,
}

/// Holds the sweep flag for the duration of one sweep.
struct SweepGuard<'a>(&'a AtomicBool);

impl<'a> SweepGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<V: Send + Sync + 'static> Cache<V> {
    // == Sweep ==
    /// Runs one sweep now.
    ///
    /// Returns `None` without doing anything if another sweep is already
    /// running. Running it twice in a row is harmless; the second pass finds
    /// nothing to remove.
    pub fn sweep(&self) -> Option<SweepReport> {
        let Some(_guard) = SweepGuard::acquire(&self.inner.sweeping) else {
            debug!("Sweep already in progress; skipping");
            return None;
        };

        let now = self.inner.clock.now_ms();
        let mut store = self.inner.store.lock();
        let expired = store.remove_expired(now);
        let evicted = store.enforce_watermark();
        let persisted = self.rewrite_mirror(&store);
        self.publish(&store);
        drop(store);

        self.inner.stats.record_expirations(expired.len());
        self.inner.stats.record_evictions(evicted.len());

        let report = SweepReport {
            expired: expired.len(),
            evicted: evicted.len(),
            persisted,
        };
        if report.expired > 0 || report.evicted > 0 {
            info!(
                "Sweep: removed {} expired and {} evicted entries",
                report.expired, report.evicted
            );
        } else {
            debug!(persisted, "Sweep: nothing to remove");
        }
        Some(report)
    }

    // == Start Sweeper ==
    /// Registers the periodic sweep on `scheduler` at the configured
    /// interval, replacing any previous registration.
    ///
    /// The registration does not keep the cache alive: once the last handle
    /// is dropped the timer is cancelled.
    pub fn start_sweeper(&self, scheduler: &dyn Scheduler) {
        let weak = Arc::downgrade(&self.inner);
        let tick: Tick = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                Cache { inner }.sweep();
            }
        });

        let interval = self.inner.config.sweep_interval();
        let handle = scheduler.schedule(interval, tick);
        let previous = self.inner.sweeper.lock().replace(handle);
        if let Some(previous) = previous {
            previous.cancel();
            debug!("Replaced previous sweeper registration");
        }
        info!(
            "Starting expiry sweeper with interval of {} ms",
            interval.as_millis()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ManualClock, SetOptions};
    use crate::config::Config;
    use crate::tasks::ManualScheduler;
    use std::time::Duration;

    fn cache_with_clock(config: Config) -> (Cache<String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(10_000));
        let cache = Cache::builder(config)
            .clock(clock.clone())
            .weigher(|v: &String| v.len())
            .build()
            .unwrap();
        (cache, clock)
    }

    #[test]
    fn test_sweep_removes_expired_entries() {
        let (cache, clock) = cache_with_clock(Config::default());
        cache
            .set("short", "a".to_string(), SetOptions::new().ttl_ms(100))
            .unwrap();
        cache
            .set("long", "b".to_string(), SetOptions::new().ttl_ms(10_000))
            .unwrap();

        clock.advance(Duration::from_millis(101));
        let report = cache.sweep().unwrap();

        assert_eq!(
            report,
            SweepReport {
                expired: 1,
                evicted: 0,
                persisted: 0
            }
        );
        assert_eq!(cache.len(), 1);
        let stats = cache.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let (cache, clock) = cache_with_clock(Config::default());
        for i in 0..5 {
            cache
                .set(format!("k{i}"), "v".to_string(), SetOptions::new().ttl_ms(50))
                .unwrap();
        }
        clock.advance(Duration::from_millis(51));

        assert_eq!(cache.sweep().unwrap().expired, 5);
        assert_eq!(cache.sweep().unwrap(), SweepReport::default());
        assert_eq!(cache.stats().expirations, 5);
    }

    #[test]
    fn test_overlapping_sweep_is_skipped() {
        let (cache, _) = cache_with_clock(Config::default());

        cache.inner.sweeping.store(true, Ordering::SeqCst);
        assert!(cache.sweep().is_none());

        cache.inner.sweeping.store(false, Ordering::SeqCst);
        assert!(cache.sweep().is_some());
        assert!(!cache.inner.sweeping.load(Ordering::SeqCst));
    }

    #[test]
    fn test_sweeper_runs_on_tick() {
        let (cache, clock) = cache_with_clock(Config {
            sweep_interval_ms: 60_000,
            ..Config::default()
        });
        let scheduler = ManualScheduler::new();
        cache.start_sweeper(&scheduler);
        assert_eq!(scheduler.intervals(), vec![Duration::from_secs(60)]);

        cache
            .set("k", "v".to_string(), SetOptions::new().ttl_ms(10))
            .unwrap();
        clock.advance(Duration::from_millis(11));

        assert_eq!(scheduler.fire(), 1);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_start_sweeper_replaces_previous() {
        let (cache, _) = cache_with_clock(Config::default());
        let scheduler = ManualScheduler::new();

        cache.start_sweeper(&scheduler);
        cache.start_sweeper(&scheduler);
        assert_eq!(scheduler.active(), 1);
    }

    #[test]
    fn test_destroy_cancels_and_is_idempotent() {
        let (cache, _) = cache_with_clock(Config::default());
        let scheduler = ManualScheduler::new();
        cache.start_sweeper(&scheduler);

        cache.destroy();
        assert_eq!(scheduler.active(), 0);
        cache.destroy();
        assert_eq!(scheduler.fire(), 0);
    }

    #[test]
    fn test_dropping_last_handle_cancels_sweeper() {
        let (cache, _) = cache_with_clock(Config::default());
        let scheduler = ManualScheduler::new();
        cache.start_sweeper(&scheduler);
        let other = cache.clone();

        drop(cache);
        assert_eq!(scheduler.active(), 1);
        drop(other);
        assert_eq!(scheduler.active(), 0);
    }

    #[test]
    fn test_sweep_enforces_watermark() {
        let (cache, clock) = cache_with_clock(Config {
            memory_budget: 1000,
            high_watermark: 0.5,
            max_entry_fraction: 0.5,
            max_evictions_per_admission: 0,
            ..Config::default()
        });
        for key in ["a", "b", "c"] {
            cache
                .set(key, "x".repeat(300), SetOptions::new())
                .unwrap();
            clock.advance(Duration::from_millis(1));
        }
        // A zero cap leaves the soft pass to the sweeper
        assert_eq!(cache.stats().memory_usage, 900);

        let report = cache.sweep().unwrap();
        assert_eq!(report.evicted, 2);
        assert!(cache.has("c"));
        assert_eq!(cache.stats().memory_usage, 300);
    }
}

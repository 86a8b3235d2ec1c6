//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Cache and server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Global memory budget in bytes, charged by entry size
    pub memory_budget: usize,
    /// Default TTL in milliseconds for entries without explicit TTL
    pub default_ttl_ms: u64,
    /// Fraction of the budget above which LRU eviction kicks in
    pub high_watermark: f64,
    /// Largest fraction of the budget a single entry may occupy
    pub max_entry_fraction: f64,
    /// Soft cap on evictions performed by a single admission
    pub max_evictions_per_admission: usize,
    /// Expiry sweep interval in milliseconds
    pub sweep_interval_ms: u64,
    /// Rewrite the durable mirror on every persistent set.
    ///
    /// Each such set snapshots every persistent entry under the store lock,
    /// which is linear in their number (payloads are shared, not copied).
    /// JSON encoding and the write happen on the mirror task.
    pub mirror_on_set: bool,
    /// Directory for the durable mirror; `None` runs memory-only
    pub snapshot_dir: Option<PathBuf>,
    /// HTTP server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MEMORY_BUDGET` - Memory budget in bytes (default: 64 MiB)
    /// - `DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 300000)
    /// - `HIGH_WATERMARK` - Eviction threshold as a budget fraction (default: 0.8)
    /// - `MAX_ENTRY_FRACTION` - Per-entry size limit as a budget fraction (default: 0.1)
    /// - `MAX_EVICTIONS_PER_ADMISSION` - Soft eviction cap per set (default: 64)
    /// - `SWEEP_INTERVAL_MS` - Sweep frequency in milliseconds (default: 300000)
    /// - `MIRROR_ON_SET` - Rewrite the mirror on persistent sets (default: true)
    /// - `SNAPSHOT_DIR` - Mirror directory (default: unset, memory-only)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            memory_budget: env_or("CACHE_MEMORY_BUDGET", defaults.memory_budget),
            default_ttl_ms: env_or("DEFAULT_TTL_MS", defaults.default_ttl_ms),
            high_watermark: env_or("HIGH_WATERMARK", defaults.high_watermark),
            max_entry_fraction: env_or("MAX_ENTRY_FRACTION", defaults.max_entry_fraction),
            max_evictions_per_admission: env_or(
                "MAX_EVICTIONS_PER_ADMISSION",
                defaults.max_evictions_per_admission,
            ),
            sweep_interval_ms: env_or("SWEEP_INTERVAL_MS", defaults.sweep_interval_ms),
            mirror_on_set: env_or("MIRROR_ON_SET", defaults.mirror_on_set),
            snapshot_dir: env::var("SNAPSHOT_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            server_port: env_or("SERVER_PORT", defaults.server_port),
        }
    }

    /// Checks that fractions and sizes are usable.
    pub fn validate(&self) -> Result<()> {
        if self.memory_budget == 0 {
            return Err(CacheError::InvalidConfig(
                "memory budget must be greater than zero".to_string(),
            ));
        }
        if !(self.high_watermark > 0.0 && self.high_watermark <= 1.0) {
            return Err(CacheError::InvalidConfig(format!(
                "high watermark must be in (0, 1], got {}",
                self.high_watermark
            )));
        }
        if !(self.max_entry_fraction > 0.0 && self.max_entry_fraction <= 1.0) {
            return Err(CacheError::InvalidConfig(format!(
                "max entry fraction must be in (0, 1], got {}",
                self.max_entry_fraction
            )));
        }
        if self.sweep_interval_ms == 0 {
            return Err(CacheError::InvalidConfig(
                "sweep interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Usage above which the soft eviction pass runs.
    pub fn high_watermark_bytes(&self) -> usize {
        (self.memory_budget as f64 * self.high_watermark) as usize
    }

    /// Largest single entry `set()` will admit.
    pub fn max_entry_bytes(&self) -> usize {
        (self.memory_budget as f64 * self.max_entry_fraction) as usize
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_budget: 64 * 1024 * 1024,
            default_ttl_ms: 300_000,
            high_watermark: 0.8,
            max_entry_fraction: 0.1,
            max_evictions_per_admission: 64,
            sweep_interval_ms: 300_000,
            mirror_on_set: true,
            snapshot_dir: None,
            server_port: 3000,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

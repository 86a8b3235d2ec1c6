//! tiercache - An in-process cache with a durable mirror
//!
//! Provides TTL expiration, tag-based invalidation, LRU eviction under a
//! memory budget, and optional mirroring of persistent entries to durable
//! storage so they survive a restart.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod persist;
pub mod tasks;

pub use api::AppState;
pub use cache::{
    Cache, CacheBuilder, CacheStats, Cacheable, Clock, ManualClock, SetOptions, SystemClock,
};
pub use config::Config;
pub use error::{CacheError, MirrorError};
pub use persist::{DurableStorage, FileStorage, MemoryStorage};
pub use tasks::{ManualScheduler, Scheduler, SweepReport, TaskHandle, TokioScheduler};

//! Cache Module
//!
//! In-memory caching with TTL expiration, tag invalidation and LRU eviction
//! under a memory budget.

mod cacheable;
mod clock;
mod entry;
mod facade;
mod lru;
mod stats;
mod store;
mod tags;


// Re-export public types
pub use cacheable::Cacheable;
pub use clock::{current_timestamp_ms, duration_ms, Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use facade::{json_weight, Cache, CacheBuilder, SetOptions, Weigher};
pub use lru::LruTracker;
pub use stats::{CacheStats, StatsCollector};
pub use store::{Admission, CacheStore, Limits, Lookup, Removed};
pub use tags::TagIndex;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

//! Persistence Module
//!
//! Durable mirror for entries marked persistent: the storage collaborator,
//! the snapshot format, and the mirror that ties them to the cache.

mod mirror;
mod snapshot;
mod storage;

pub use mirror::Mirror;
pub use snapshot::{ParsedSnapshot, Snapshot, SnapshotRecord, SNAPSHOT_KEY, SNAPSHOT_VERSION};
pub use storage::{DurableStorage, FileStorage, MemoryStorage};

//! Persistent Mirror Module
//!
//! Keeps persistent entries in durable storage so they survive a restart.
//! The snapshot is always rewritten whole. Writes are handed to a single
//! background task over a channel, so the cache never waits on storage and
//! snapshots land in the order they were taken.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::cache::CacheEntry;
use crate::error::MirrorError;
use crate::persist::snapshot::{Snapshot, SNAPSHOT_KEY};
use crate::persist::DurableStorage;

/// A full-state change to apply to storage. Only the latest one matters.
#[derive(Debug)]
enum StateOp {
    Write(Snapshot),
    Remove,
}

#[derive(Debug)]
enum MirrorCommand {
    Apply(StateOp),
    Flush(oneshot::Sender<()>),
}

// == Mirror ==
pub struct Mirror<V> {
    storage: Arc<dyn DurableStorage>,
    tx: mpsc::UnboundedSender<MirrorCommand>,
    encode: fn(&V) -> serde_json::Result<Value>,
    decode: fn(Value) -> serde_json::Result<V>,
}

impl<V> std::fmt::Debug for Mirror<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mirror")
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl<V: Serialize + DeserializeOwned> Mirror<V> {
    /// Creates the mirror and spawns its writer task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(storage: Arc<dyn DurableStorage>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(Arc::clone(&storage), rx));
        Self {
            storage,
            tx,
            encode: |value| serde_json::to_value(value),
            decode: serde_json::from_value,
        }
    }
}

impl<V> Mirror<V> {
    // == Encode ==
    /// JSON form of a payload, or `None` (with a warning) if it cannot be
    /// serialized. The entry then lives in memory only.
    pub fn encode(&self, key: &str, payload: &V) -> Option<Value> {
        match (self.encode)(payload) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %MirrorError::from(e), "Payload not persisted");
                None
            }
        }
    }

    // == Schedule Rewrite ==
    /// Queues a rewrite of the whole snapshot from `entries`.
    ///
    /// Returns the number of entries in the queued snapshot.
    pub fn schedule_rewrite<'a, I>(&self, entries: I) -> usize
    where
        V: 'a,
        I: IntoIterator<Item = (&'a String, &'a CacheEntry<V>)>,
    {
        let snapshot = Snapshot::from_entries(entries);
        let count = snapshot.len();
        self.send(MirrorCommand::Apply(StateOp::Write(snapshot)));
        count
    }

    /// Queues removal of the snapshot.
    pub fn schedule_remove(&self) {
        self.send(MirrorCommand::Apply(StateOp::Remove));
    }

    // == Flush ==
    /// Waits until every queued operation has been attempted.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(MirrorCommand::Flush(ack_tx));
        // A closed channel means the writer is gone; nothing left to wait for
        let _ = ack_rx.await;
    }

    fn send(&self, command: MirrorCommand) {
        if self.tx.send(command).is_err() {
            warn!("Mirror writer has stopped; persistence disabled");
        }
    }

    // == Load ==
    /// Reads the stored snapshot and returns the entries still worth keeping,
    /// newest first.
    ///
    /// Never fails: unreadable storage or an unparsable snapshot yields an
    /// empty list and a logged error.
    pub async fn load(
        &self,
        now: u64,
        weigh: &(dyn Fn(&V) -> usize + Sync),
    ) -> Vec<(String, CacheEntry<V>)> {
        let text = match self.storage.read(SNAPSHOT_KEY).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!("No mirror snapshot found");
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "Mirror unavailable at startup; starting empty");
                return Vec::new();
            }
        };

        let parsed = match Snapshot::parse(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(error = %e, "Discarding unreadable mirror snapshot");
                return Vec::new();
            }
        };

        let total = parsed.records.len() + parsed.skipped;
        let mut expired = 0usize;
        let mut undecodable = 0usize;
        let mut restored = Vec::with_capacity(parsed.records.len());

        for (key, record) in parsed.records {
            if record.is_expired(now) {
                expired += 1;
                continue;
            }
            let encoded =
                Arc::try_unwrap(record.payload).unwrap_or_else(|shared| Value::clone(&shared));
            let payload = match (self.decode)(encoded.clone()) {
                Ok(payload) => payload,
                Err(e) => {
                    debug!(key = %key, error = %e, "Skipping undecodable snapshot entry");
                    undecodable += 1;
                    continue;
                }
            };
            let size = weigh(&payload);
            let entry = CacheEntry::new(Arc::new(payload), record.created_at, record.ttl_ms, size)
                .with_tags(record.tags)
                .with_persistence(record.persistent, Some(encoded));
            restored.push((key, entry));
        }

        restored.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at));

        info!(
            total,
            restorable = restored.len(),
            expired,
            malformed = parsed.skipped + undecodable,
            "Loaded mirror snapshot"
        );
        restored
    }
}

// == Writer Task ==
async fn run_writer(
    storage: Arc<dyn DurableStorage>,
    mut rx: mpsc::UnboundedReceiver<MirrorCommand>,
) {
    let mut healthy = true;

    while let Some(command) = rx.recv().await {
        let mut latest = None;
        let mut acks = Vec::new();

        let mut absorb = |command: MirrorCommand| match command {
            MirrorCommand::Apply(op) => latest = Some(op),
            MirrorCommand::Flush(ack) => acks.push(ack),
        };
        absorb(command);
        while let Ok(command) = rx.try_recv() {
            absorb(command);
        }

        if let Some(op) = latest {
            let result = match op {
                StateOp::Write(snapshot) => write_snapshot(storage.as_ref(), &snapshot).await,
                StateOp::Remove => storage.remove(SNAPSHOT_KEY).await,
            };
            match result {
                Ok(()) if !healthy => {
                    info!("Mirror storage recovered");
                    healthy = true;
                }
                Ok(()) => debug!("Mirror snapshot written"),
                Err(e) => {
                    if healthy {
                        warn!(error = %e, "Mirror write failed; running memory-only until storage recovers");
                    } else {
                        debug!(error = %e, "Mirror write failed again");
                    }
                    healthy = false;
                }
            }
        }

        for ack in acks {
            let _ = ack.send(());
        }
    }

    debug!("Mirror writer stopped");
}

async fn write_snapshot(
    storage: &dyn DurableStorage,
    snapshot: &Snapshot,
) -> Result<(), MirrorError> {
    let document = snapshot.to_json()?;
    storage.write(SNAPSHOT_KEY, document).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryStorage;
    use std::collections::BTreeMap;

    fn persistent_entry(value: &str, created_at: u64, ttl_ms: u64) -> CacheEntry<String> {
        CacheEntry::new(Arc::new(value.to_string()), created_at, ttl_ms, value.len())
            .with_tags(["t"])
            .with_persistence(true, Some(Value::from(value)))
    }

    #[tokio::test]
    async fn test_rewrite_then_load() {
        let storage = Arc::new(MemoryStorage::new());
        let mirror: Mirror<String> = Mirror::spawn(storage.clone());

        let mut entries = BTreeMap::new();
        entries.insert("a".to_string(), persistent_entry("alpha", 100, 10_000));
        entries.insert("b".to_string(), persistent_entry("beta", 200, 10_000));

        assert_eq!(mirror.schedule_rewrite(&entries), 2);
        mirror.flush().await;

        let loaded = mirror.load(1_000, &|v: &String| v.len()).await;
        let keys: Vec<&str> = loaded.iter().map(|(k, _)| k.as_str()).collect();
        // Newest first
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(loaded[1].1.payload.as_str(), "alpha");
        assert!(loaded[1].1.tags.contains("t"));
        assert!(loaded[1].1.persistent);
    }

    #[tokio::test]
    async fn test_queued_rewrites_coalesce_to_latest() {
        let storage = Arc::new(MemoryStorage::new());
        let mirror: Mirror<String> = Mirror::spawn(storage.clone());

        let mut entries = BTreeMap::new();
        for (i, key) in ["a", "b", "c"].into_iter().enumerate() {
            entries.insert(key.to_string(), persistent_entry(key, i as u64, 10_000));
            mirror.schedule_rewrite(&entries);
        }
        // A queued snapshot is unaffected by later changes to the store
        entries.clear();
        mirror.flush().await;

        // The writer has not run yet on this runtime, so all three arrive together
        assert_eq!(storage.write_count(), 1);
        let loaded = mirror.load(100, &|v: &String| v.len()).await;
        assert_eq!(loaded.len(), 3);
    }

    #[tokio::test]
    async fn test_load_drops_expired_records() {
        let storage = Arc::new(MemoryStorage::new());
        let mirror: Mirror<String> = Mirror::spawn(storage.clone());

        let mut entries = BTreeMap::new();
        entries.insert("short".to_string(), persistent_entry("s", 0, 1_000));
        entries.insert("long".to_string(), persistent_entry("l", 0, 100_000));
        mirror.schedule_rewrite(&entries);
        mirror.flush().await;

        let loaded = mirror.load(5_000, &|v: &String| v.len()).await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].0, "long");
    }

    #[tokio::test]
    async fn test_load_survives_corrupt_snapshot() {
        let storage = Arc::new(MemoryStorage::new());
        storage.put_raw(SNAPSHOT_KEY, "{ this is not json");
        let mirror: Mirror<String> = Mirror::spawn(storage.clone());

        assert!(mirror.load(0, &|v: &String| v.len()).await.is_empty());
    }

    #[tokio::test]
    async fn test_load_skips_undecodable_payloads() {
        let storage = Arc::new(MemoryStorage::new());
        storage.put_raw(
            SNAPSHOT_KEY,
            r#"{"version":1,"entries":{
                "ok":{"payload":"text","createdAt":0,"ttlMs":1000},
                "bad":{"payload":{"not":"a string"},"createdAt":0,"ttlMs":1000}
            }}"#,
        );
        let mirror: Mirror<String> = Mirror::spawn(storage.clone());

        let loaded = mirror.load(10, &|v: &String| v.len()).await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].0, "ok");
    }

    #[tokio::test]
    async fn test_load_with_storage_down_starts_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.put_raw(
            SNAPSHOT_KEY,
            r#"{"version":1,"entries":{"ok":{"payload":"x","createdAt":0,"ttlMs":1000}}}"#,
        );
        storage.set_failing(true);
        let mirror: Mirror<String> = Mirror::spawn(storage.clone());

        assert!(mirror.load(10, &|v: &String| v.len()).await.is_empty());
    }

    #[tokio::test]
    async fn test_writer_survives_storage_failure() {
        let storage = Arc::new(MemoryStorage::new());
        let mirror: Mirror<String> = Mirror::spawn(storage.clone());
        let mut entries = BTreeMap::new();
        entries.insert("a".to_string(), persistent_entry("alpha", 0, 10_000));

        storage.set_failing(true);
        mirror.schedule_rewrite(&entries);
        mirror.flush().await;
        assert!(storage.raw(SNAPSHOT_KEY).is_none());

        storage.set_failing(false);
        mirror.schedule_rewrite(&entries);
        mirror.flush().await;
        assert!(storage.raw(SNAPSHOT_KEY).is_some());

        mirror.schedule_remove();
        mirror.flush().await;
        assert!(storage.raw(SNAPSHOT_KEY).is_none());
    }
}

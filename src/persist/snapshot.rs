//! Snapshot Module
//!
//! The document the mirror writes: a versioned map from key to entry record.
//!
//! ```json
//! {"version": 1, "entries": {"user:1": {"payload": {}, "createdAt": 0,
//!   "ttlMs": 60000, "tags": ["users"], "persistent": true}}}
//! ```
//!
//! A bare key-to-record map without the envelope is also accepted on read.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cache::CacheEntry;
use crate::error::MirrorError;

/// Newest snapshot format this build reads and the one it writes.
pub const SNAPSHOT_VERSION: u64 = 1;

/// Storage key the snapshot is written under.
pub const SNAPSHOT_KEY: &str = "tiercache.snapshot";

// == Snapshot Record ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRecord {
    pub payload: Arc<Value>,
    pub created_at: u64,
    pub ttl_ms: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_persistent")]
    pub persistent: bool,
}

fn default_persistent() -> bool {
    true
}

impl SnapshotRecord {
    pub fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.created_at) > self.ttl_ms
    }
}

// == Snapshot ==
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub version: u64,
    pub entries: BTreeMap<String, SnapshotRecord>,
}

/// Records recovered from a stored snapshot.
#[derive(Debug, Default)]
pub struct ParsedSnapshot {
    pub records: Vec<(String, SnapshotRecord)>,
    /// Entries that were present but malformed
    pub skipped: usize,
}

impl Snapshot {
    /// Builds a snapshot from mirrorable entries; others are ignored.
    ///
    /// Payloads are shared with the entries, so this only copies keys, tags
    /// and timestamps. Serializing happens later, off the caller's path.
    pub fn from_entries<'a, V: 'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a CacheEntry<V>)>,
    {
        let entries = entries
            .into_iter()
            .filter_map(|(key, entry)| {
                let payload = entry.encoded.clone().filter(|_| entry.persistent)?;
                Some((
                    key.clone(),
                    SnapshotRecord {
                        payload,
                        created_at: entry.created_at,
                        ttl_ms: entry.ttl_ms,
                        tags: entry.tags.iter().cloned().collect(),
                        persistent: entry.persistent,
                    },
                ))
            })
            .collect();

        Self {
            version: SNAPSHOT_VERSION,
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> Result<String, MirrorError> {
        Ok(serde_json::to_string(self)?)
    }

    // == Parse ==
    /// Parses a stored snapshot, skipping individually malformed entries.
    ///
    /// Fails only when the document as a whole is unusable.
    pub fn parse(text: &str) -> Result<ParsedSnapshot, MirrorError> {
        let document: Value = serde_json::from_str(text)
            .map_err(|e| MirrorError::CorruptSnapshot(format!("not valid JSON: {e}")))?;

        let Value::Object(mut root) = document else {
            return Err(MirrorError::CorruptSnapshot(
                "top level is not an object".to_string(),
            ));
        };

        let entries = if is_envelope(&root) {
            let found = root
                .get("version")
                .and_then(Value::as_u64)
                .unwrap_or(SNAPSHOT_VERSION);
            if found > SNAPSHOT_VERSION {
                return Err(MirrorError::UnsupportedVersion {
                    found,
                    supported: SNAPSHOT_VERSION,
                });
            }
            match root.remove("entries") {
                Some(Value::Object(entries)) => entries,
                _ => Map::new(),
            }
        } else {
            root
        };

        let mut parsed = ParsedSnapshot::default();
        for (key, raw) in entries {
            match serde_json::from_value::<SnapshotRecord>(raw) {
                Ok(record) => parsed.records.push((key, record)),
                Err(_) => parsed.skipped += 1,
            }
        }
        Ok(parsed)
    }
}

/// A versioned document has a numeric `version` and, if present, an object
/// under `entries`. Anything else is read as a bare key-to-record map, where
/// `version` and `entries` are ordinary cache keys.
fn is_envelope(root: &Map<String, Value>) -> bool {
    let numeric_version = root.get("version").is_some_and(Value::is_u64);
    let entries_shape = match root.get("entries") {
        None | Some(Value::Object(_)) => true,
        Some(_) => false,
    };
    numeric_version && entries_shape
}

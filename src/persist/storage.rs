//! Durable Storage Module
//!
//! The key/value collaborator the mirror writes snapshots to. Implementations
//! must be thread-safe; every failure is reported as a `MirrorError` and
//! handled by the mirror, never by cache callers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::fs;

use crate::error::MirrorError;

/// Durable key/value storage backend.
#[async_trait]
pub trait DurableStorage: Send + Sync + std::fmt::Debug {
    /// Reads the value stored under `key`, or `None` if nothing is stored.
    async fn read(&self, key: &str) -> Result<Option<String>, MirrorError>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn write(&self, key: &str, value: String) -> Result<(), MirrorError>;

    /// Removes `key`. Removing a missing key succeeds.
    async fn remove(&self, key: &str) -> Result<(), MirrorError>;
}

// == File Storage ==
/// Stores each key as a JSON file in a directory.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file_name}.json"))
    }
}

#[async_trait]
impl DurableStorage for FileStorage {
    async fn read(&self, key: &str) -> Result<Option<String>, MirrorError> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, value: String) -> Result<(), MirrorError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), MirrorError> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// == Memory Storage ==
/// In-process storage, mainly for tests and restarts simulated within one
/// process. Can be switched into a failing mode.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Raw stored value, bypassing failure injection.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.data.lock().get(key).cloned()
    }

    /// Seeds a raw value, bypassing failure injection.
    pub fn put_raw(&self, key: &str, value: impl Into<String>) {
        self.data.lock().insert(key.to_string(), value.into());
    }

    fn check(&self) -> Result<(), MirrorError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(MirrorError::StorageUnavailable(
                "memory storage is in failing mode".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DurableStorage for MemoryStorage {
    async fn read(&self, key: &str) -> Result<Option<String>, MirrorError> {
        self.check()?;
        Ok(self.data.lock().get(key).cloned())
    }

    async fn write(&self, key: &str, value: String) -> Result<(), MirrorError> {
        self.check()?;
        self.data.lock().insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), MirrorError> {
        self.check()?;
        self.data.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_storage_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("mirror"));

        assert_eq!(storage.read("snap").await.unwrap(), None);

        storage.write("snap", "{\"a\":1}".to_string()).await.unwrap();
        assert_eq!(
            storage.read("snap").await.unwrap().as_deref(),
            Some("{\"a\":1}")
        );

        storage.write("snap", "{}".to_string()).await.unwrap();
        assert_eq!(storage.read("snap").await.unwrap().as_deref(), Some("{}"));

        storage.remove("snap").await.unwrap();
        assert_eq!(storage.read("snap").await.unwrap(), None);
        // Removing twice is fine
        storage.remove("snap").await.unwrap();
    }

    #[tokio::test]
    async fn test_file_storage_sanitizes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());

        storage
            .write("../escape/attempt", "x".to_string())
            .await
            .unwrap();

        assert!(dir.path().join(".._escape_attempt.json").exists());
    }

    #[tokio::test]
    async fn test_memory_storage_failure_mode() {
        let storage = MemoryStorage::new();
        storage.write("k", "v".to_string()).await.unwrap();
        assert_eq!(storage.write_count(), 1);

        storage.set_failing(true);
        assert!(matches!(
            storage.read("k").await,
            Err(MirrorError::StorageUnavailable(_))
        ));
        assert!(storage.write("k", "w".to_string()).await.is_err());
        assert_eq!(storage.raw("k").as_deref(), Some("v"));

        storage.set_failing(false);
        assert_eq!(storage.read("k").await.unwrap().as_deref(), Some("v"));
    }
}

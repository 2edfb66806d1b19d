//! Key-value storage backends.
//!
//! The store layer only needs `get`/`set`/`remove` on JSON values plus a
//! usage query, the same surface a browser's sync storage area offers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage quota exceeded ({used} of {quota} bytes)")]
    QuotaExceeded { used: u64, quota: u64 },

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUsage {
    pub used: u64,
    pub total: u64,
    pub percentage: u8,
}

impl StorageUsage {
    pub fn new(used: u64, total: u64) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            ((used as f64 / total as f64) * 100.0).round().min(255.0) as u8
        };
        Self {
            used,
            total,
            percentage,
        }
    }
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
    async fn usage(&self) -> Result<StorageUsage, StorageError>;
}

/// Bytes a map occupies, counted as key length plus serialized value length.
fn bytes_in_use(entries: &BTreeMap<String, Value>) -> u64 {
    entries
        .iter()
        .map(|(key, value)| (key.len() + value.to_string().len()) as u64)
        .sum()
}

fn check_quota(entries: &BTreeMap<String, Value>, quota: u64) -> Result<(), StorageError> {
    let used = bytes_in_use(entries);
    if used > quota {
        return Err(StorageError::QuotaExceeded { used, quota });
    }
    Ok(())
}

/// In-process store with a byte quota.
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
    quota: u64,
}

impl MemoryStore {
    pub fn new(quota: u64) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            quota,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(crate::constants::STORAGE_QUOTA_BYTES)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        next.insert(key.to_string(), value);
        check_quota(&next, self.quota)?;
        *entries = next;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn usage(&self) -> Result<StorageUsage, StorageError> {
        Ok(StorageUsage::new(bytes_in_use(&self.entries.lock()), self.quota))
    }
}

/// Single JSON document on disk.
///
/// The document is re-read on every access so separate processes (the CLI
/// and a running `takeover run`) observe each other's writes. Writes go to
/// a temp file that is renamed over the document.
pub struct FileStore {
    path: PathBuf,
    quota: u64,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(path: P, quota: u64) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            quota,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, Value>, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, entries: &BTreeMap<String, Value>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(entries)?;
        let temp_file = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_file, &bytes).await?;
        tokio::fs::rename(&temp_file, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), value);
        check_quota(&entries, self.quota)?;
        self.save(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        if entries.remove(key).is_some() {
            self.save(&entries).await?;
        }
        Ok(())
    }

    async fn usage(&self) -> Result<StorageUsage, StorageError> {
        Ok(StorageUsage::new(bytes_in_use(&self.load().await?), self.quota))
    }
}

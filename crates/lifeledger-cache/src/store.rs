//! Cache store implementations

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::CacheError;
use crate::CacheStore;

// ==================== File-Backed Cache ====================

/// Default cache implementation: one JSON file per key in a directory
#[derive(Debug, Clone)]
pub struct JsonFileCache {
    dir: PathBuf,
}

impl JsonFileCache {
    /// Create a cache rooted at the given directory
    ///
    /// The directory is created lazily on the first write.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl CacheStore for JsonFileCache {
    async fn save(&self, key: &str, value: &serde_json::Value) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CacheError::WriteFailed {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        let content =
            serde_json::to_string_pretty(value).map_err(|e| CacheError::Serialization {
                message: e.to_string(),
            })?;

        let path = self.path_for(key);
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| CacheError::WriteFailed {
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    async fn load(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let path = self.path_for(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::IoError(e)),
        };

        match serde_json::from_str(&content) {
            Ok(value) => Ok(Some(value)),
            Err(e) => Err(CacheError::Corrupt {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::IoError(e)),
        }
    }
}

// ==================== In-Memory Cache ====================

/// In-memory cache backend
///
/// Used by tests and as a fallback when no durable directory is
/// available. `fail_writes` simulates storage-quota exhaustion.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, serde_json::Value>>,
    fail_writes: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent save fail, as a full device would
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Overwrite a key with raw (possibly invalid) content
    pub fn poison(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_string(), serde_json::Value::String("{not json".to_string()));
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn save(&self, key: &str, value: &serde_json::Value) -> Result<(), CacheError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::WriteFailed {
                key: key.to_string(),
                message: "storage quota exceeded".to_string(),
            });
        }
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let entries = self.entries.lock().unwrap();
        match entries.get(key) {
            // A plain string entry marks poisoned content, mirroring a
            // file cache that fails to parse.
            Some(serde_json::Value::String(s)) if s.starts_with('{') => Err(CacheError::Corrupt {
                key: key.to_string(),
                message: "invalid JSON".to_string(),
            }),
            Some(value) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_file_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonFileCache::new(dir.path().to_path_buf());

        let doc = json!([{"id": "a", "date": "2024-06-15T10:30:00Z"}]);
        cache.save("transactions", &doc).await.unwrap();

        let loaded = cache.load("transactions").await.unwrap().unwrap();
        assert_eq!(loaded, doc);
    }

    #[tokio::test]
    async fn test_file_cache_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonFileCache::new(dir.path().to_path_buf());
        assert!(cache.load("paymentMethods").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_cache_corrupt_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("categories.json"), "{not json at all").unwrap();

        let cache = JsonFileCache::new(dir.path().to_path_buf());
        let err = cache.load("categories").await.unwrap_err();
        assert!(err.is_corrupt());
    }

    #[tokio::test]
    async fn test_file_cache_remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonFileCache::new(dir.path().to_path_buf());
        assert!(cache.remove("debtLoans").await.is_ok());
    }

    #[tokio::test]
    async fn test_file_cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let doc = json!([{"id": "pm-1"}]);
        {
            let cache = JsonFileCache::new(dir.path().to_path_buf());
            cache.save("paymentMethods", &doc).await.unwrap();
        }
        let reopened = JsonFileCache::new(dir.path().to_path_buf());
        let loaded = reopened.load("paymentMethods").await.unwrap().unwrap();
        assert_eq!(loaded, doc);
    }

    #[tokio::test]
    async fn test_memory_cache_write_failure() {
        let cache = MemoryCache::new();
        cache.set_fail_writes(true);
        let err = cache.save("transactions", &json!([])).await.unwrap_err();
        assert!(matches!(err, CacheError::WriteFailed { .. }));
    }

    #[tokio::test]
    async fn test_memory_cache_poisoned_key() {
        let cache = MemoryCache::new();
        cache.poison("transactions");
        let err = cache.load("transactions").await.unwrap_err();
        assert!(err.is_corrupt());
    }
}

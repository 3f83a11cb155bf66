//! Device-local cache persistence for lifeledger
//!
//! A durable key/value store holding one JSON document per collection
//! kind. The cache survives process restart, has no network dependency,
//! and never blocks the in-memory ledger: a write failure is reported to
//! the caller as an error value, corrupt content is reported as such so
//! the caller can degrade to an empty collection.

use async_trait::async_trait;
use std::sync::Arc;

pub mod error;
pub mod store;

pub use error::CacheError;
pub use store::{JsonFileCache, MemoryCache};

/// Cache reference type
pub type CacheRef = Arc<dyn CacheStore>;

// ==================== Cache Trait ====================

/// Trait for device-local cache backends
///
/// Keys are collection names; values are the JSON-serialized array of
/// that collection's entities. Date fields inside the values are already
/// ISO-8601 strings, so round-trips are exact.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Persist one collection document under the given key
    async fn save(&self, key: &str, value: &serde_json::Value) -> Result<(), CacheError>;

    /// Load a collection document; `Ok(None)` means nothing was ever saved
    async fn load(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError>;

    /// Remove a key; removing a missing key is not an error
    async fn remove(&self, key: &str) -> Result<(), CacheError>;
}

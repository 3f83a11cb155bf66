//! In-memory remote store
//!
//! Reference `RemoteStore` backed by per-user namespaces in process
//! memory, with a switchable availability flag to exercise offline and
//! partial-failure paths. Used by the test suite and by local
//! development without a real backend.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;

use lifeledger_core::{EntityKind, LedgerData, LedgerRecord};

use crate::error::SyncError;
use crate::remote::{RemoteChange, RemoteStore};

pub struct MemoryRemoteStore {
    namespaces: Mutex<HashMap<String, LedgerData>>,
    feeds: Mutex<HashMap<String, broadcast::Sender<RemoteChange>>>,
    available: AtomicBool,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            namespaces: Mutex::new(HashMap::new()),
            feeds: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the backend dropping off the network
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Records of one kind stored for a user; test helper
    pub fn record_count(&self, user_id: &str, kind: EntityKind) -> usize {
        self.namespaces
            .lock()
            .unwrap()
            .get(user_id)
            .map(|data| data.records(kind).len())
            .unwrap_or(0)
    }

    fn check_available(&self) -> Result<(), SyncError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::Offline)
        }
    }

    fn emit(&self, user_id: &str, change: RemoteChange) {
        if let Some(feed) = self.feeds.lock().unwrap().get(user_id) {
            let _ = feed.send(change);
        }
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn fetch_all(&self, user_id: &str) -> Result<LedgerData, SyncError> {
        self.check_available()?;
        Ok(self
            .namespaces
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn put(&self, user_id: &str, record: &LedgerRecord) -> Result<(), SyncError> {
        self.check_available()?;
        self.namespaces
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_default()
            .insert(record.clone());
        self.emit(user_id, RemoteChange::Upserted(record.clone()));
        Ok(())
    }

    async fn delete(&self, user_id: &str, kind: EntityKind, id: &str) -> Result<(), SyncError> {
        self.check_available()?;
        let removed = self
            .namespaces
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_default()
            .remove(kind, id);
        if removed.is_some() {
            self.emit(
                user_id,
                RemoteChange::Deleted {
                    kind,
                    id: id.to_string(),
                },
            );
        }
        Ok(())
    }

    fn subscribe(&self, user_id: &str) -> broadcast::Receiver<RemoteChange> {
        self.feeds
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .subscribe()
    }
}

//! Remote store port
//!
//! The async interface the sync engine speaks to whatever backs the
//! shared store. Implementations must key every record by entity id
//! inside a per-user namespace, which is what makes replayed pushes
//! idempotent.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

use lifeledger_core::{EntityKind, LedgerData, LedgerRecord};

use crate::error::SyncError;

/// A change observed on the remote store
#[derive(Debug, Clone)]
pub enum RemoteChange {
    Upserted(LedgerRecord),
    Deleted { kind: EntityKind, id: String },
}

/// Backend-agnostic remote store interface
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the full remote snapshot for one user
    async fn fetch_all(&self, user_id: &str) -> Result<LedgerData, SyncError>;

    /// Create or overwrite one record, keyed by id
    async fn put(&self, user_id: &str, record: &LedgerRecord) -> Result<(), SyncError>;

    /// Remove one record; removing a missing record succeeds
    async fn delete(&self, user_id: &str, kind: EntityKind, id: &str) -> Result<(), SyncError>;

    /// Subscribe to the user's change feed
    ///
    /// The feed includes echoes of this device's own writes; consumers
    /// must tolerate re-applying them.
    fn subscribe(&self, user_id: &str) -> broadcast::Receiver<RemoteChange>;
}

/// Shared reference to a remote store implementation
pub type RemoteRef = Arc<dyn RemoteStore>;

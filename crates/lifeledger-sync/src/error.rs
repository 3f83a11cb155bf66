//! Error types for lifeledger-sync

use thiserror::Error;

/// Errors from the sync layer
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote store is unreachable; retry after reconnect
    #[error("Remote store unavailable")]
    Offline,

    /// The remote store refused the operation; retrying will not help
    #[error("Remote store rejected the operation: {message}")]
    RemoteRejected { message: String },

    /// Wire payload could not be encoded or decoded
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Local persistence failed while saving sync state
    #[error("Sync state persistence failed: {message}")]
    Persistence { message: String },

    #[error("Ledger error: {0}")]
    Core(#[from] lifeledger_core::CoreError),
}

impl SyncError {
    /// Whether retrying the same operation can succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Offline)
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_offline_is_transient() {
        assert!(SyncError::Offline.is_transient());
        assert!(!SyncError::RemoteRejected {
            message: "bad record".to_string()
        }
        .is_transient());
        assert!(!SyncError::Serialization {
            message: "eof".to_string()
        }
        .is_transient());
    }
}

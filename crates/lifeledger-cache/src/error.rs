//! Error types for lifeledger-cache

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Corrupt cache content for key '{key}': {message}")]
    Corrupt { key: String, message: String },

    #[error("Write failed for key '{key}': {message}")]
    WriteFailed { key: String, message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("IO error")]
    IoError(#[from] io::Error),
}

impl CacheError {
    /// Corrupt content is recoverable: the caller treats the collection as
    /// empty instead of failing the whole ledger.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, CacheError::Corrupt { .. })
    }
}

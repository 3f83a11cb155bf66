//! Error types for lifeledger-core
//!
//! Error codes, severities, and the main `CoreError` enum used across
//! the ledger store, merge resolver, and backup codec.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Entity not found
    NotFound,
    /// Validation error
    ValidationError,
    /// Invalid backup document
    InvalidBackup,
    /// Cache persistence failure
    CacheError,
    /// Internal error
    InternalError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::NotFound => write!(f, "NOT_FOUND"),
            ErrorCode::ValidationError => write!(f, "VALIDATION_ERROR"),
            ErrorCode::InvalidBackup => write!(f, "INVALID_BACKUP"),
            ErrorCode::CacheError => write!(f, "CACHE_ERROR"),
            ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Informational
    Info,
    /// Warning - operation may be affected
    Warning,
    /// Error - operation failed
    Error,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "info"),
            ErrorSeverity::Warning => write!(f, "warning"),
            ErrorSeverity::Error => write!(f, "error"),
        }
    }
}

/// Main error type for lifeledger-core
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Invalid backup document: {message}")]
    InvalidBackup { message: String },

    #[error("Cache persistence failure: {message}")]
    CacheError { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl CoreError {
    /// Get the error code
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::NotFound { .. } => ErrorCode::NotFound,
            CoreError::ValidationError { .. } => ErrorCode::ValidationError,
            CoreError::InvalidBackup { .. } => ErrorCode::InvalidBackup,
            CoreError::CacheError { .. } => ErrorCode::CacheError,
            CoreError::InternalError { .. } => ErrorCode::InternalError,
        }
    }

    /// Get the severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CoreError::NotFound { .. } => ErrorSeverity::Info,
            CoreError::ValidationError { .. } => ErrorSeverity::Warning,
            CoreError::InvalidBackup { .. } => ErrorSeverity::Error,
            CoreError::CacheError { .. } => ErrorSeverity::Warning,
            CoreError::InternalError { .. } => ErrorSeverity::Error,
        }
    }

    /// Log the error at a level matching its severity
    pub fn log(&self) {
        match self.severity() {
            ErrorSeverity::Info => log::info!("[{}] {}", self.code(), self),
            ErrorSeverity::Warning => log::warn!("[{}] {}", self.code(), self),
            ErrorSeverity::Error => log::error!("[{}] {}", self.code(), self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = CoreError::InvalidBackup {
            message: "missing debtLoans".to_string(),
        };
        assert_eq!(err.code(), ErrorCode::InvalidBackup);
        assert_eq!(err.severity(), ErrorSeverity::Error);
        assert!(err.to_string().contains("missing debtLoans"));
    }

    #[test]
    fn test_validation_error_is_warning() {
        let err = CoreError::ValidationError {
            message: "amount must be positive".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Warning);
        assert_eq!(err.code().to_string(), "VALIDATION_ERROR");
    }
}

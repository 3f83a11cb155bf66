//! Configuration management for lifeledger
//!
//! This module handles loading, validation, and management of
//! lifeledger configuration from YAML files.

pub mod error;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use error::ConfigError;

// ==================== Configuration Types ====================

/// Data directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Path to the local cache directory
    #[serde(default = "default_data_path")]
    pub path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: default_data_path(),
        }
    }
}

fn default_data_path() -> PathBuf {
    PathBuf::from("./data")
}

/// Session identity configuration
///
/// The identity provider is an external collaborator; the configuration
/// only carries the stable user id it yields. A missing user id means
/// the ledger runs in local-only mode.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionConfig {
    /// Authenticated user id, if any
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Remote synchronization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Maximum push attempts before a change is deferred as pending
    #[serde(default = "default_max_push_attempts")]
    pub max_push_attempts: u32,
    /// Base delay for exponential push backoff, in milliseconds
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Upper bound for a single backoff delay, in milliseconds
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_push_attempts: default_max_push_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
        }
    }
}

fn default_max_push_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    250
}

fn default_backoff_cap_ms() -> u64 {
    5000
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Data directory settings
    #[serde(default)]
    pub data: DataConfig,
    /// Session identity settings
    #[serde(default)]
    pub session: SessionConfig,
    /// Remote synchronization settings
    #[serde(default)]
    pub sync: SyncConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load(path: PathBuf) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            });
        }

        let content = std::fs::read_to_string(&path).map_err(|_| ConfigError::IoError)?;

        let config: Config =
            serde_yaml::from_str(&content).map_err(|_| ConfigError::InvalidYaml)?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.max_push_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sync.max_push_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if self.sync.backoff_base_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sync.backoff_base_ms".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        if self.sync.backoff_cap_ms < self.sync.backoff_base_ms {
            return Err(ConfigError::InvalidValue {
                field: "sync.backoff_cap_ms".to_string(),
                reason: "must not be smaller than backoff_base_ms".to_string(),
            });
        }

        if let Some(user_id) = &self.session.user_id {
            if user_id.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "session.user_id".to_string(),
                    reason: "must not be blank when present".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Check if the session is authenticated
    pub fn is_authenticated(&self) -> bool {
        self.session.user_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sync.max_push_attempts, 3);
        assert_eq!(config.sync.backoff_base_ms, 250);
        assert_eq!(config.sync.backoff_cap_ms, 5000);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.data.path, PathBuf::from("./data"));
        assert!(!config.is_authenticated());
    }

    #[test]
    fn test_parse_partial_yaml_uses_defaults() {
        let yaml = "sync:\n  max_push_attempts: 5\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.sync.max_push_attempts, 5);
        assert_eq!(config.sync.backoff_base_ms, 250);
        assert_eq!(config.data.path, PathBuf::from("./data"));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let yaml = "sync:\n  max_push_attempts: 0\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_validate_rejects_inverted_backoff_bounds() {
        let yaml = "sync:\n  backoff_base_ms: 1000\n  backoff_cap_ms: 100\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_user_id() {
        let yaml = "session:\n  user_id: \"  \"\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_authenticated_session() {
        let yaml = "session:\n  user_id: user-1\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert!(config.is_authenticated());
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(PathBuf::from("/nonexistent/config.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }
}

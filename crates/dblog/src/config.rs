//! Configuration types for dblog
//!
//! Everything is read from one TOML file. Every field has a default, so an
//! empty file is a valid configuration; only [`DbLogConfig::open_store`]
//! insists on a `[store]` section.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dblog_store::{InMemoryStore, RedbStore, RedbStoreConfig, Store};
use serde::{Deserialize, Serialize};

use crate::codec::{DEFAULT_MAX_PAYLOAD_BYTES, EventCodec};
use crate::error::ConfigError;
use crate::query::DEFAULT_BATCH_SIZE;
use crate::writer::FailurePolicy;

/// Main dblog configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbLogConfig {
    /// Table holding the records
    pub table_name: String,
    /// Pause between tail polls, in milliseconds
    pub poll_interval_ms: u64,
    /// Entries requested per store scan
    pub scan_batch_size: usize,
    /// Encoded records larger than this are replaced by a diagnostic
    pub max_payload_bytes: usize,
    /// What the sink does after a diagnostic write
    pub failure_policy: FailurePolicy,
    /// Storage backend; required to write or query
    pub store: Option<StoreConfig>,
    /// Process logging setup
    pub logging: LoggingConfig,
}

impl Default for DbLogConfig {
    fn default() -> Self {
        Self {
            table_name: "log".to_string(),
            poll_interval_ms: 1000,
            scan_batch_size: DEFAULT_BATCH_SIZE,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            failure_policy: FailurePolicy::default(),
            store: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl DbLogConfig {
    /// Create a config for development (redb under `./data`, debug console)
    pub fn development() -> Self {
        Self {
            store: Some(StoreConfig::Redb {
                path: PathBuf::from("./data/dblog.redb"),
                cache_size: default_cache_size(),
            }),
            logging: LoggingConfig {
                default_level: "debug".to_string(),
                console: ConsoleConfig {
                    enabled: true,
                    json: false,
                    ansi: true,
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Create a config for testing (memory store, quiet, keeps logging
    /// after a diagnostic write)
    pub fn testing() -> Self {
        Self {
            poll_interval_ms: 10,
            failure_policy: FailurePolicy::Continue,
            store: Some(StoreConfig::Memory),
            logging: LoggingConfig {
                default_level: "warn".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Read a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Open the configured store
    pub fn open_store(&self) -> Result<Arc<dyn Store>, ConfigError> {
        match &self.store {
            None => Err(ConfigError::MissingStore),
            Some(StoreConfig::Memory) => Ok(Arc::new(InMemoryStore::new())),
            Some(StoreConfig::Redb { path, cache_size }) => {
                let store = RedbStore::open(RedbStoreConfig {
                    db_path: path.clone(),
                    cache_size: *cache_size,
                })?;
                Ok(Arc::new(store))
            }
        }
    }

    pub fn codec(&self) -> EventCodec {
        EventCodec::new(self.max_payload_bytes)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Storage backend selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// In-process tables, gone when the store is dropped
    Memory,
    /// Single-file redb database
    Redb {
        path: PathBuf,
        #[serde(default = "default_cache_size")]
        cache_size: usize,
    },
}

fn default_cache_size() -> usize {
    RedbStoreConfig::default().cache_size
}

/// Process logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level directive (overridden by RUST_LOG)
    pub default_level: String,
    /// Console output configuration
    pub console: ConsoleConfig,
    /// File output configuration
    pub file: Option<FileConfig>,
    /// Targets logged at debug regardless of the default level
    pub debug_targets: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            console: ConsoleConfig::default(),
            file: None,
            debug_targets: Vec::new(),
        }
    }
}

/// Console output configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Enable console output
    pub enabled: bool,
    /// JSON lines instead of fixed-width text
    pub json: bool,
    /// Include ANSI colors
    pub ansi: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            json: false,
            ansi: false,
        }
    }
}

/// File output configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Directory for log files
    pub directory: PathBuf,
    /// File name prefix
    pub prefix: String,
    /// Rotation strategy
    pub rotation: RotationStrategy,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./logs"),
            prefix: "dblog".to_string(),
            rotation: RotationStrategy::Daily,
        }
    }
}

/// File rotation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    /// Rotate daily
    #[default]
    Daily,
    /// Rotate hourly
    Hourly,
    /// Never rotate (single file)
    Never,
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = DbLogConfig::default();
        assert_eq!(config.table_name, "log");
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.failure_policy, FailurePolicy::Exit);
        assert!(config.store.is_none());
        assert!(config.logging.console.enabled);
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(DbLogConfig::from_toml_str("").unwrap(), DbLogConfig::default());
    }

    #[test]
    fn test_full_file() {
        let config = DbLogConfig::from_toml_str(
            r#"
            table_name = "events"
            poll_interval_ms = 250
            scan_batch_size = 64
            failure_policy = "continue"

            [store]
            backend = "redb"
            path = "/var/lib/dblog/log.redb"

            [logging]
            default_level = "debug"
            console = { json = true }
            file = { directory = "/var/log/dblog", rotation = "hourly" }
            debug_targets = ["dblog::query"]
            "#,
        )
        .unwrap();

        assert_eq!(config.table_name, "events");
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.scan_batch_size, 64);
        assert_eq!(config.failure_policy, FailurePolicy::Continue);
        assert_eq!(
            config.store,
            Some(StoreConfig::Redb {
                path: PathBuf::from("/var/lib/dblog/log.redb"),
                cache_size: 64 * 1024 * 1024,
            })
        );
        assert!(config.logging.console.json);
        assert!(config.logging.console.enabled);
        let file = config.logging.file.unwrap();
        assert_eq!(file.rotation, RotationStrategy::Hourly);
        assert_eq!(file.prefix, "dblog");
        assert_eq!(config.logging.debug_targets, vec!["dblog::query"]);
    }

    #[test]
    fn test_invalid_file() {
        assert!(matches!(
            DbLogConfig::from_toml_str("failure_policy = \"panic\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            DbLogConfig::load("/definitely/not/here.toml"),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_missing_store() {
        assert!(matches!(
            DbLogConfig::default().open_store(),
            Err(ConfigError::MissingStore)
        ));
    }

    #[test]
    fn test_open_redb_store() {
        let dir = TempDir::new().unwrap();
        let config = DbLogConfig {
            store: Some(StoreConfig::Redb {
                path: dir.path().join("nested/log.redb"),
                cache_size: 1024 * 1024,
            }),
            ..DbLogConfig::default()
        };

        assert!(config.open_store().is_ok());
        assert!(dir.path().join("nested/log.redb").exists());
    }

    #[test]
    fn test_presets() {
        let dev = DbLogConfig::development();
        assert_eq!(dev.logging.default_level, "debug");
        assert!(matches!(dev.store, Some(StoreConfig::Redb { .. })));

        let testing = DbLogConfig::testing();
        assert_eq!(testing.store, Some(StoreConfig::Memory));
        assert_eq!(testing.failure_policy, FailurePolicy::Continue);
    }
}

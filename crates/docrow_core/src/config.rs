//! Runtime configuration for the storage layer and logging.
//!
//! # Responsibility
//! - Load an optional JSON config file with defaults for missing keys.
//! - Apply `DOCROW_*` environment overrides on top of the file values.
//!
//! # Invariants
//! - A missing config file is not an error; defaults apply.
//! - `pool_size` is at least 1 after validation.

use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_DB_PATH: &str = "DOCROW_DB_PATH";
pub const ENV_POOL_SIZE: &str = "DOCROW_POOL_SIZE";
pub const ENV_LOG_LEVEL: &str = "DOCROW_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "DOCROW_LOG_DIR";

const DEFAULT_POOL_SIZE: u32 = 4;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config `{}`: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config `{}`: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value `{value}` for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Storage settings. `path = None` selects an in-memory database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
    pub pool_size: u32,
    pub busy_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            pool_size: DEFAULT_POOL_SIZE,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    /// Rolling log directory. Logging stays off when unset.
    pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub log: LogConfig,
}

impl AppConfig {
    /// Reads `path` when it exists, otherwise returns defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(path) = lookup(ENV_DB_PATH).filter(|value| !value.trim().is_empty()) {
            self.database.path = Some(PathBuf::from(path));
        }
        if let Some(raw) = lookup(ENV_POOL_SIZE) {
            self.database.pool_size =
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: ENV_POOL_SIZE,
                        value: raw.clone(),
                    })?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log.level = level;
        }
        if let Some(dir) = lookup(ENV_LOG_DIR).filter(|value| !value.trim().is_empty()) {
            self.log.dir = Some(PathBuf::from(dir));
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "database.pool_size",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, ConfigError, ENV_DB_PATH, ENV_LOG_LEVEL, ENV_POOL_SIZE};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.database.path, None);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docrow.json");
        std::fs::write(&path, r#"{"database": {"pool_size": 9}}"#).unwrap();

        let config = AppConfig::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.database.pool_size, 9);
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert_eq!(config.log, AppConfig::default().log);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docrow.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = AppConfig::load_or_default(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(lookup(&[
                (ENV_DB_PATH, "/tmp/docrow.sqlite3"),
                (ENV_POOL_SIZE, "2"),
                (ENV_LOG_LEVEL, "warn"),
            ]))
            .unwrap();

        assert_eq!(
            config.database.path,
            Some(PathBuf::from("/tmp/docrow.sqlite3"))
        );
        assert_eq!(config.database.pool_size, 2);
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn zero_or_garbage_pool_size_is_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(lookup(&[(ENV_POOL_SIZE, "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == ENV_POOL_SIZE));

        let err = config
            .apply_overrides(lookup(&[(ENV_POOL_SIZE, "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}

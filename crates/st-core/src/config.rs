//! Configuration types and parsing for stratum.yml

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default migrations directory, relative to the project root
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

/// Default database file, relative to the project root
pub const DEFAULT_DATABASE_PATH: &str = "stratum.duckdb";

/// Identity recorded when neither config nor environment provide one
pub const FALLBACK_IDENTITY: &str = "system";

/// Config file names looked up in the project directory, in order
pub const CONFIG_FILE_NAMES: &[&str] = &["stratum.yml", "stratum.yaml"];

/// Project configuration from stratum.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Database connection configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Directory containing migration SQL files
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: String,

    /// Identity stamped on ledger entries and the lock row.
    /// Falls back to `$USER`, then `system`.
    #[serde(default)]
    pub executed_by: Option<String>,

    /// Persist the `error` ledger entry of a failed run after the batch
    /// transaction has been rolled back, instead of inside it.
    #[serde(default)]
    pub audit_failures: bool,
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Path to the DuckDB database file, or `:memory:`
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            migrations_dir: default_migrations_dir(),
            executed_by: None,
            audit_failures: false,
        }
    }
}

fn default_migrations_dir() -> String {
    DEFAULT_MIGRATIONS_DIR.to_string()
}

fn default_database_path() -> String {
    DEFAULT_DATABASE_PATH.to_string()
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| CoreError::ConfigParseError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a project directory.
    ///
    /// Looks for stratum.yml or stratum.yaml; a project without either file
    /// runs with defaults.
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        for file_name in CONFIG_FILE_NAMES {
            let path = dir.join(file_name);
            if path.exists() {
                return Self::load(&path);
            }
        }
        log::debug!(
            "No stratum config in {}, using defaults",
            dir.display()
        );
        Ok(Self::default())
    }

    /// Validate the configuration
    pub fn validate(&self) -> CoreResult<()> {
        if self.migrations_dir.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "migrations_dir cannot be empty".to_string(),
            });
        }
        if self.database.path.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "database.path cannot be empty".to_string(),
            });
        }
        if matches!(&self.executed_by, Some(id) if id.trim().is_empty()) {
            return Err(CoreError::ConfigInvalid {
                message: "executed_by cannot be blank".to_string(),
            });
        }
        Ok(())
    }

    /// Absolute migrations directory for a project rooted at `root`
    pub fn migrations_dir_absolute(&self, root: &Path) -> PathBuf {
        root.join(&self.migrations_dir)
    }

    /// Database path resolved against `root`; `:memory:` is passed through
    pub fn database_path_absolute(&self, root: &Path) -> String {
        if self.database.path == ":memory:" || Path::new(&self.database.path).is_absolute() {
            self.database.path.clone()
        } else {
            root.join(&self.database.path).display().to_string()
        }
    }

    /// Identity recorded on ledger entries and lock acquisitions
    pub fn resolve_executed_by(&self) -> String {
        self.executed_by
            .clone()
            .or_else(|| std::env::var("USER").ok().filter(|u| !u.is_empty()))
            .unwrap_or_else(|| FALLBACK_IDENTITY.to_string())
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

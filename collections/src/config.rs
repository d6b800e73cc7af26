//! Configuration for the embedding store.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use embeddb_embeddings::DEFAULT_BATCH_SIZE;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CollectionError, Result};

/// Environment variable overriding the directory that holds the database.
pub const USER_PATH_ENV: &str = "EMBEDDB_USER_PATH";

/// File name of the database inside the user directory.
pub const DATABASE_FILE: &str = "embeddings.db";

/// Configuration for the content store and the collections built on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the SQLite database file.
    pub database_path: PathBuf,

    /// Batch size used when neither the caller nor the model picks one.
    pub default_batch_size: usize,

    /// Reuse the stored vector when an item is re-submitted with unchanged
    /// content instead of calling the model again.
    pub skip_unchanged: bool,

    /// Maximum number of pooled database connections.
    pub max_connections: u32,
}

impl StoreConfig {
    /// Create a configuration for the given database file with default values.
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            default_batch_size: DEFAULT_BATCH_SIZE,
            skip_unchanged: true,
            max_connections: 4,
        }
    }

    /// Set the default batch size.
    pub fn with_default_batch_size(mut self, batch_size: usize) -> Self {
        self.default_batch_size = batch_size;
        self
    }

    /// Enable or disable the unchanged-content short-circuit.
    pub fn with_skip_unchanged(mut self, skip_unchanged: bool) -> Self {
        self.skip_unchanged = skip_unchanged;
        self
    }

    /// Set the connection pool size.
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Parse a configuration from TOML. Missing keys take default values.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| CollectionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        debug!("Loaded store configuration from {}", path.display());
        Self::from_toml_str(&source)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.default_batch_size == 0 {
            return Err(CollectionError::Config(
                "default_batch_size must be positive".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(CollectionError::Config(
                "max_connections must be positive".to_string(),
            ));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(CollectionError::Config(
                "database_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(user_dir().join(DATABASE_FILE))
    }
}

/// Directory holding embeddb's data: `$EMBEDDB_USER_PATH` if set, otherwise
/// `embeddb/` under the platform data directory.
pub fn user_dir() -> PathBuf {
    user_dir_from(std::env::var_os(USER_PATH_ENV))
}

fn user_dir_from(env_value: Option<OsString>) -> PathBuf {
    match env_value {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => dirs::data_dir().unwrap_or_default().join("embeddb"),
    }
}

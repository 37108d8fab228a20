//! Configuration for the synchronization service
//!
//! Values are layered: built-in defaults, then an optional configuration
//! file, then environment variables prefixed `TABLEMAP__` (nested keys are
//! separated by `__`, e.g. `TABLEMAP__DESTINATION__HOST`). Command-line
//! flags are applied on top by the binary.

use std::path::PathBuf;
use std::time::Duration;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tablemap_core::CoreConfig;

use crate::error::{to_config_error, Result};

/// Destination PostgreSQL store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationConfig {
    /// Host name or address
    pub host: String,

    /// Port
    pub port: u16,

    /// User
    pub user: String,

    /// Password
    pub password: String,

    /// Database name
    pub dbname: String,

    /// Maximum number of pooled connections
    pub pool_size: usize,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            dbname: "tablemap".to_string(),
            pool_size: 8,
        }
    }
}

/// Synchronization service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Catalog snapshot file
    pub catalog_path: PathBuf,

    /// SQLite row store file
    pub row_store_path: PathBuf,

    /// Destination store; nothing is mirrored or materialized without one
    pub destination: Option<DestinationConfig>,

    /// Timeout of one upstream operation, in seconds
    pub fetch_timeout_secs: u64,

    /// Timeout of one destination operation, in seconds
    pub destination_timeout_secs: u64,

    /// Period of the scheduler loop, in seconds
    pub scheduler_tick_secs: u64,

    /// Period of catalog reloads while running, in seconds
    pub catalog_reload_secs: u64,

    /// Engine settings
    pub core: CoreConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("tablemap-catalog.json"),
            row_store_path: PathBuf::from("tablemap-rows.db"),
            destination: None,
            fetch_timeout_secs: 30,
            destination_timeout_secs: 30,
            scheduler_tick_secs: 1,
            catalog_reload_secs: 30,
            core: CoreConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&SyncConfig::default()).map_err(to_config_error)?);

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }

        builder
            .add_source(
                Environment::with_prefix("TABLEMAP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(Config::try_deserialize)
            .map_err(to_config_error)
    }

    /// Upstream operation timeout
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    /// Destination operation timeout
    pub fn destination_timeout(&self) -> Duration {
        Duration::from_secs(self.destination_timeout_secs.max(1))
    }

    /// Scheduler loop period
    pub fn scheduler_tick(&self) -> Duration {
        Duration::from_secs(self.scheduler_tick_secs.max(1))
    }

    /// Catalog reload period
    pub fn catalog_reload(&self) -> Duration {
        Duration::from_secs(self.catalog_reload_secs.max(1))
    }
}

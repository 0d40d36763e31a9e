//! # Core Configuration Module
//!
//! Provides configuration management for the library core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance. `build()` validates every setting up front so a bad value fails at
//! startup rather than in the middle of a flush or a push.
//!
//! ## Settings
//!
//! | Setting | Default | Used by |
//! |---------|---------|---------|
//! | `database_path` | required (or `in_memory()`) | resource store |
//! | `push_cooldown` | 500 ms | edit log replay |
//! | `size_check_interval` | 1000 writes | resource store map growth |
//! | `map_growth_factor` | 4 | resource store map growth |
//! | `initial_map_size` | 100 485 760 bytes | resource store |
//! | `reject_duplicates` | `true` | reconciliation |
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/library.db")
//!     .push_cooldown(Duration::from_millis(250))
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // Neither a database path nor in-memory storage was chosen
//! let config = CoreConfig::builder()
//!     .build()
//!     .expect("Should fail - no storage location");
//! ```

use crate::error::{Error, Result};
use crate::logging::LoggingConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default pause between two remote calls during a push.
pub const DEFAULT_PUSH_COOLDOWN: Duration = Duration::from_millis(500);

/// Default number of write operations between two map size checks.
pub const DEFAULT_SIZE_CHECK_INTERVAL: u64 = 1000;

/// Default multiplier applied to the used size when growing the map.
pub const DEFAULT_MAP_GROWTH_FACTOR: u64 = 4;

/// Default memory map size of a fresh store.
pub const DEFAULT_INITIAL_MAP_SIZE: u64 = 100_485_760;

/// Where the resource store keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    File(PathBuf),
    InMemory,
}

/// Core configuration for the library core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub storage: StorageLocation,

    /// Pause between consecutive remote calls of one push batch
    pub push_cooldown: Duration,

    /// Write operations between two checks of the backing map size
    pub size_check_interval: u64,

    /// Safety factor applied to the used size when the map grows
    pub map_growth_factor: u64,

    /// Map size applied when the store is opened
    pub initial_map_size: u64,

    /// Whether reconciliation fails on duplicate entries instead of dropping them
    pub reject_duplicates: bool,

    pub logging: LoggingConfig,
}

impl CoreConfig {
    /// Create a new configuration builder.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Database file path, `None` for in-memory storage.
    pub fn database_path(&self) -> Option<&Path> {
        match &self.storage {
            StorageLocation::File(path) => Some(path),
            StorageLocation::InMemory => None,
        }
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    storage: Option<StorageLocation>,
    push_cooldown: Option<Duration>,
    size_check_interval: Option<u64>,
    map_growth_factor: Option<u64>,
    initial_map_size: Option<u64>,
    reject_duplicates: Option<bool>,
    logging: Option<LoggingConfig>,
}

impl CoreConfigBuilder {
    /// Store the library in the SQLite file at `path`.
    pub fn database_path(mut self, path: impl AsRef<Path>) -> Self {
        self.storage = Some(StorageLocation::File(path.as_ref().to_path_buf()));
        self
    }

    /// Keep the library in memory. Nothing survives the process.
    pub fn in_memory(mut self) -> Self {
        self.storage = Some(StorageLocation::InMemory);
        self
    }

    pub fn push_cooldown(mut self, cooldown: Duration) -> Self {
        self.push_cooldown = Some(cooldown);
        self
    }

    pub fn size_check_interval(mut self, writes: u64) -> Self {
        self.size_check_interval = Some(writes);
        self
    }

    pub fn map_growth_factor(mut self, factor: u64) -> Self {
        self.map_growth_factor = Some(factor);
        self
    }

    pub fn initial_map_size(mut self, bytes: u64) -> Self {
        self.initial_map_size = Some(bytes);
        self
    }

    pub fn reject_duplicates(mut self, reject: bool) -> Self {
        self.reject_duplicates = Some(reject);
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// - `Error::Config` when no storage location was chosen
    /// - `Error::InvalidSetting` when a numeric setting is out of range
    pub fn build(self) -> Result<CoreConfig> {
        let storage = self.storage.ok_or_else(|| {
            Error::Config(
                "No storage location configured. Call database_path() for a \
                 persistent library or in_memory() for a throwaway one."
                    .to_string(),
            )
        })?;

        if let StorageLocation::File(path) = &storage {
            if path.as_os_str().is_empty() {
                return Err(invalid("database_path", "path must not be empty"));
            }
        }

        let size_check_interval = self
            .size_check_interval
            .unwrap_or(DEFAULT_SIZE_CHECK_INTERVAL);
        if size_check_interval == 0 {
            return Err(invalid("size_check_interval", "must be at least 1"));
        }

        let map_growth_factor = self.map_growth_factor.unwrap_or(DEFAULT_MAP_GROWTH_FACTOR);
        if map_growth_factor < 2 {
            return Err(invalid("map_growth_factor", "must be at least 2"));
        }

        let initial_map_size = self.initial_map_size.unwrap_or(DEFAULT_INITIAL_MAP_SIZE);
        if initial_map_size == 0 {
            return Err(invalid("initial_map_size", "must be positive"));
        }

        Ok(CoreConfig {
            storage,
            push_cooldown: self.push_cooldown.unwrap_or(DEFAULT_PUSH_COOLDOWN),
            size_check_interval,
            map_growth_factor,
            initial_map_size,
            reject_duplicates: self.reject_duplicates.unwrap_or(true),
            logging: self.logging.unwrap_or_default(),
        })
    }
}

fn invalid(setting: &str, message: &str) -> Error {
    Error::InvalidSetting {
        setting: setting.to_string(),
        message: message.to_string(),
    }
}

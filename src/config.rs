//! Configuration for securekv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::Result;
use crate::naming::{self, DeviceId, StorePaths};

/// Main configuration for a SecureStore instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the store and swap files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── secure_{offset}_{id}.data
    ///     └── secure_{offset}_{id}.swap   (only during a commit)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Device Identity
    // -------------------------------------------------------------------------
    /// Numeric offset distinguishing processes on one host (PORT_OFFSET)
    pub port_offset: String,

    /// Hardware identifier the store file is named after
    pub device_id: DeviceId,

    // -------------------------------------------------------------------------
    // Durability
    // -------------------------------------------------------------------------
    /// Whether the swap file is fsynced before it is renamed into place
    pub sync_strategy: SyncStrategy,
}

/// Sync strategy for swap file commits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync the swap file before every rename (crash safe)
    EveryCommit,

    /// Skip fsync entirely (tests and benchmarks only)
    Never,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./securekv_data"),
            port_offset: naming::DEFAULT_PORT_OFFSET.to_string(),
            device_id: DeviceId::default(),
            sync_strategy: SyncStrategy::EveryCommit,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Resolve the data and swap file paths for this device
    pub fn paths(&self) -> Result<StorePaths> {
        StorePaths::new(&self.data_dir, &self.port_offset, self.device_id)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the port offset explicitly
    pub fn port_offset(mut self, offset: impl Into<String>) -> Self {
        self.config.port_offset = offset.into();
        self
    }

    /// Take the port offset from `PORT_OFFSET`, or "0" if unset
    pub fn port_offset_from_env(mut self) -> Self {
        self.config.port_offset = naming::port_offset_from_env();
        self
    }

    /// Set the device identifier
    pub fn device_id(mut self, id: impl Into<DeviceId>) -> Self {
        self.config.device_id = id.into();
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

//! Store File Naming
//!
//! Derives the per-device data and swap file paths.
//!
//! ## Layout
//! ```text
//! {data_dir}/
//!   ├── secure_{offset}_{device_id}.data   (live store file)
//!   └── secure_{offset}_{device_id}.swap   (next version, renamed over .data)
//! ```
//!
//! `offset` comes from the `PORT_OFFSET` environment variable so several
//! simulated devices can share one directory. `device_id` is the EUI-64 read
//! as a big-endian integer, printed in lowercase hex without padding.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, StoreError};

/// Environment variable carrying the port offset
pub const PORT_OFFSET_ENV: &str = "PORT_OFFSET";

/// Offset used when `PORT_OFFSET` is not set
pub const DEFAULT_PORT_OFFSET: &str = "0";

/// 8-byte hardware identifier (IEEE EUI-64) of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceId([u8; 8]);

impl DeviceId {
    /// Wrap an EUI-64 as delivered by the radio, most significant byte first
    pub fn from_eui64(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// The raw EUI-64 bytes
    pub fn eui64(&self) -> [u8; 8] {
        self.0
    }

    /// The identifier as a big-endian integer
    pub fn as_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }
}

impl From<u64> for DeviceId {
    fn from(value: u64) -> Self {
        Self(value.to_be_bytes())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.as_u64())
    }
}

impl FromStr for DeviceId {
    type Err = StoreError;

    /// Parse exactly 16 hex digits, e.g. `18b4300000000001`
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_start_matches("0x");
        let bytes = hex::decode(trimmed)
            .map_err(|e| StoreError::Config(format!("Invalid device id {:?}: {}", s, e)))?;

        let eui64: [u8; 8] = bytes.try_into().map_err(|b: Vec<u8>| {
            StoreError::Config(format!(
                "Device id must be 8 bytes, got {} in {:?}",
                b.len(),
                s
            ))
        })?;

        Ok(Self(eui64))
    }
}

/// Read the port offset from the environment, falling back to `"0"`
pub fn port_offset_from_env() -> String {
    std::env::var(PORT_OFFSET_ENV).unwrap_or_else(|_| DEFAULT_PORT_OFFSET.to_string())
}

/// Resolved file locations for one device's store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    /// Directory holding both files
    pub dir: PathBuf,
    /// Live store file
    pub data: PathBuf,
    /// Swap file renamed over `data` on commit
    pub swap: PathBuf,
}

impl StorePaths {
    /// Build the paths for a device
    ///
    /// The offset must be a non-empty run of ASCII digits; anything else could
    /// escape the directory or collide with another device's files.
    pub fn new(dir: &Path, port_offset: &str, device_id: DeviceId) -> Result<Self> {
        if port_offset.is_empty() || !port_offset.bytes().all(|b| b.is_ascii_digit()) {
            return Err(StoreError::Config(format!(
                "Port offset must be numeric, got {:?}",
                port_offset
            )));
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            data: dir.join(file_name(port_offset, device_id, "data")),
            swap: dir.join(file_name(port_offset, device_id, "swap")),
        })
    }
}

/// "secure_{offset}_{id}.{ext}"
fn file_name(port_offset: &str, device_id: DeviceId, ext: &str) -> String {
    format!("secure_{}_{}.{}", port_offset, device_id, ext)
}

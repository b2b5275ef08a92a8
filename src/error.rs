//! Error types for securekv
//!
//! Provides a unified error type for all store operations.
//!
//! Errors fall into two tiers. `NotFound` is an ordinary outcome callers are
//! expected to check. Everything else means the environment is broken (disk
//! full, permissions, closed store) and must not be ignored.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for securekv operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // Lookup Results
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    NotFound,

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to create storage directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open store file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Usage Errors
    // -------------------------------------------------------------------------
    #[error("Store is not open")]
    NotOpen,

    #[error("Value of {0} bytes exceeds the 65535 byte record limit")]
    ValueTooLarge(usize),

    #[error("Invalid occurrence index: {0}")]
    InvalidIndex(i32),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether this error is unrecoverable for the caller.
    ///
    /// Only `NotFound` is a normal result; the rest indicate storage or usage
    /// failures that should terminate whatever is driving the store.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, StoreError::NotFound)
    }
}

//! # securekv
//!
//! A small persistent key-value store for device configuration secrets:
//! - 16-bit keys, each holding an ordered list of values selected by index
//! - One store file per device, named from its hardware identifier
//! - Crash-safe updates: every mutation writes a swap file and renames it
//!   over the live file
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       SecureStore                            │
//! │        get / set / add / append / delete / wipe              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │RecordScanner│          │ SwapWriter  │
//!   │ (linear)    │          │(tmp+rename) │
//!   └──────┬──────┘          └──────┬──────┘
//!          │                        │
//!          ▼                        ▼
//!   secure_{offset}_{id}.data ◀── secure_{offset}_{id}.swap
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod naming;
pub mod record;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::{Config, SyncStrategy};
pub use naming::{DeviceId, StorePaths};
pub use record::{Record, ScanReport};
pub use store::{Occurrence, SecureStore};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of securekv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Record Module
//!
//! The on-disk record codec, the sequential scanner and the swap file writer.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Record 1                                │
//! │ ┌─────────┬────────────┬──────────────┐ │
//! │ │ Key (2) │ Length (2) │ Value        │ │
//! │ └─────────┴────────────┴──────────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Record 2                                │
//! │ ┌─────────┬────────────┬──────────────┐ │
//! │ │ Key (2) │ Length (2) │ Value        │ │
//! │ └─────────┴────────────┴──────────────┘ │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Key and length are native-endian u16. There is no file header, no footer
//! and no checksum; the file is only walkable front to back. A record cut
//! short by a crash marks the end of valid data.

mod scanner;
mod swap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, StoreError};

pub use scanner::{validate, RecordScanner, ScanReport, Truncation};
pub use swap::SwapWriter;

/// Header size: Key (2) + Length (2) = 4 bytes
pub const HEADER_SIZE: usize = 4;

/// Largest value a record can hold
pub const MAX_VALUE_LEN: usize = u16::MAX as usize;

// =============================================================================
// Record Header
// =============================================================================

/// Fixed-size prefix of every record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub key: u16,
    pub length: u16,
}

impl RecordHeader {
    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Self {
        let mut buf = &bytes[..];
        let key = buf.get_u16_ne();
        let length = buf.get_u16_ne();
        Self { key, length }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        let mut buf = &mut out[..];
        buf.put_u16_ne(self.key);
        buf.put_u16_ne(self.length);
        out
    }

    /// Total bytes the record occupies on disk
    pub fn record_size(&self) -> u64 {
        HEADER_SIZE as u64 + u64::from(self.length)
    }
}

// =============================================================================
// Record
// =============================================================================

/// One (key, value) entry of the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: u16,
    pub value: Bytes,
}

impl Record {
    /// Build a record, rejecting values the u16 length field cannot describe
    pub fn new(key: u16, value: impl Into<Bytes>) -> Result<Self> {
        let value = value.into();
        if value.len() > MAX_VALUE_LEN {
            return Err(StoreError::ValueTooLarge(value.len()));
        }
        Ok(Self { key, value })
    }

    pub fn header(&self) -> RecordHeader {
        RecordHeader {
            key: self.key,
            // Length bounded by Record::new
            length: self.value.len() as u16,
        }
    }

    /// Append the on-disk encoding to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_slice(&self.header().encode());
        buf.put_slice(&self.value);
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.value.len()
    }
}

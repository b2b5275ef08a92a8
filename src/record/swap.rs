//! Swap File Writer
//!
//! Builds the next version of a store file beside the live one, then makes
//! it live with a single rename.
//!
//! ## Commit Sequence
//! 1. Write every record through a buffered writer
//! 2. Flush the buffer, fsync the file (unless `SyncStrategy::Never`)
//! 3. Close the file and rename it over the target
//! 4. fsync the parent directory, best effort
//!
//! A crash anywhere before step 3 leaves the target untouched.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::BytesMut;

use crate::config::SyncStrategy;
use crate::error::{Result, StoreError};

use super::{Record, RecordHeader};

/// Writer for the swap file of one commit
pub struct SwapWriter {
    /// Swap file path
    path: PathBuf,
    /// Buffered writer for performance
    writer: BufWriter<File>,
    /// Number of record headers written
    records: u64,
    /// Bytes written so far
    bytes: u64,
}

impl SwapWriter {
    /// Create (or truncate) the swap file
    pub fn create(path: &Path) -> Result<Self> {
        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let file = options.open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            records: 0,
            bytes: 0,
        })
    }

    /// Write a complete record
    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        let mut buf = BytesMut::with_capacity(record.encoded_len());
        record.encode(&mut buf);

        self.writer.write_all(&buf)?;
        self.bytes += buf.len() as u64;
        self.records += 1;
        Ok(())
    }

    /// Write a header whose value bytes follow through `Write`
    pub fn write_header(&mut self, header: RecordHeader) -> Result<()> {
        self.write_all(&header.encode())?;
        self.records += 1;
        Ok(())
    }

    /// Number of records written
    pub fn record_count(&self) -> u64 {
        self.records
    }

    /// Flush, sync and rename the swap file over `target`
    ///
    /// Returns the number of bytes in the new live file.
    pub fn commit(self, target: &Path, sync: SyncStrategy) -> Result<u64> {
        let file = self.writer.into_inner().map_err(|e| StoreError::Io(e.into_error()))?;

        if sync == SyncStrategy::EveryCommit {
            file.sync_all()?;
        }
        drop(file);

        fs::rename(&self.path, target)?;

        if sync == SyncStrategy::EveryCommit {
            let _ = sync_parent_dir(target);
        }

        tracing::trace!(
            "committed {} records ({} bytes) to {:?}",
            self.records,
            self.bytes,
            target
        );
        Ok(self.bytes)
    }

    /// Throw the swap file away without touching the live file
    pub fn discard(self) {
        let Self { path, writer, .. } = self;
        drop(writer);
        if let Err(e) = fs::remove_file(&path) {
            tracing::debug!("Failed to remove swap file {:?}: {}", path, e);
        }
    }
}

/// Raw value bytes pass straight through to the buffered writer
impl Write for SwapWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.writer.write(buf)?;
        self.bytes += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Persist the rename itself (Unix); no-op elsewhere
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => File::open(parent)?.sync_all(),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

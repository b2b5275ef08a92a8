//! Store Module
//!
//! The per-device record store.
//!
//! ## Responsibilities
//! - Own the handle on the live store file between `init` and `deinit`
//! - Answer lookups by linear scan from offset 0 (no in-memory index)
//! - Apply every mutation by writing a complete swap file and renaming it
//!   over the live file
//!
//! ## Lifecycle
//! ```text
//! Uninitialized ──init──▶ Open ──deinit──▶ Closed
//!                          │ ▲               │
//!                          └─┘               └──init──▶ Open
//!             get / set / add / append / delete
//! ```
//! `wipe` only touches the filesystem and is valid in every state.
//!
//! ## Concurrency
//! Single writer. Every operation takes `&mut self`, and no file lock is
//! taken: two processes opening the same store file will corrupt each
//! other's commits.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

use bytes::Bytes;

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::naming::StorePaths;
use crate::record::{self, Record, RecordHeader, RecordScanner, ScanReport, SwapWriter, Truncation};

/// Which occurrences of a key a delete removes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    /// The n-th record with the key, oldest first
    Nth(usize),
    /// Every record with the key
    All,
}

impl From<usize> for Occurrence {
    fn from(index: usize) -> Self {
        Occurrence::Nth(index)
    }
}

/// -1 selects every occurrence, as in the classic settings API
impl TryFrom<i32> for Occurrence {
    type Error = StoreError;

    fn try_from(index: i32) -> Result<Self> {
        match index {
            -1 => Ok(Occurrence::All),
            n if n >= 0 => Ok(Occurrence::Nth(n as usize)),
            n => Err(StoreError::InvalidIndex(n)),
        }
    }
}

/// Persistent key-value store for one device
pub struct SecureStore {
    /// Store configuration
    config: Config,

    /// Data and swap file locations
    paths: StorePaths,

    /// Handle on the live store file while open
    file: Option<File>,
}

impl SecureStore {
    /// Create a store in the Uninitialized state
    ///
    /// Only resolves paths; nothing is touched on disk until `init`.
    pub fn new(config: Config) -> Result<Self> {
        let paths = config.paths()?;
        Ok(Self {
            config,
            paths,
            file: None,
        })
    }

    /// Create and initialize in one step
    pub fn open(config: Config) -> Result<Self> {
        let mut store = Self::new(config)?;
        store.init()?;
        Ok(store)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open the store file, creating the directory and file if needed
    ///
    /// The file is scanned once to confirm it is walkable. A partial record
    /// at the end is reported and left in place.
    pub fn init(&mut self) -> Result<ScanReport> {
        fs::create_dir_all(&self.paths.dir).map_err(|source| StoreError::CreateDir {
            path: self.paths.dir.clone(),
            source,
        })?;

        let mut file = open_store_file(&self.paths.data)?;
        let report = record::validate(&mut file)?;

        if report.truncated {
            tracing::warn!(
                "Store {:?} has a partial trailing record: {} of {} bytes valid",
                self.paths.data,
                report.valid_bytes,
                report.file_size
            );
        }
        tracing::info!(
            "Opened store {:?} ({} records, {} bytes)",
            self.paths.data,
            report.records,
            report.valid_bytes
        );

        self.file = Some(file);
        Ok(report)
    }

    /// Release the file handle. Safe to call repeatedly.
    pub fn deinit(&mut self) {
        if self.file.take().is_some() {
            tracing::debug!("Closed store {:?}", self.paths.data);
        }
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get the value of the `index`-th record with `key`
    ///
    /// Returns `Ok(None)` when there is no such record, including when the
    /// record is cut short by a truncated file.
    pub fn get(&mut self, key: u16, index: usize) -> Result<Option<Vec<u8>>> {
        match self.seek_occurrence(key, index)? {
            Some((mut scanner, header)) => Ok(scanner.read_value(&header)?),
            None => Ok(None),
        }
    }

    /// Copy the value into `buf`, returning the stored length
    ///
    /// At most `buf.len()` bytes are copied. The returned length is always
    /// the full stored length, so a value larger than the buffer shows up as
    /// `len > buf.len()`.
    pub fn get_into(&mut self, key: u16, index: usize, buf: &mut [u8]) -> Result<Option<usize>> {
        match self.seek_occurrence(key, index)? {
            Some((mut scanner, header)) => {
                if scanner.read_value_into(&header, buf)? {
                    Ok(Some(usize::from(header.length)))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    /// Stored length of the value, without reading it
    pub fn value_len(&mut self, key: u16, index: usize) -> Result<Option<u16>> {
        Ok(self
            .seek_occurrence(key, index)?
            .filter(|(scanner, header)| scanner.value_available(header))
            .map(|(_, header)| header.length))
    }

    /// Every complete record in file order
    pub fn records(&mut self) -> Result<Vec<Record>> {
        let file = self.file.as_mut().ok_or(StoreError::NotOpen)?;
        let scanner = RecordScanner::new(file)?;
        Ok(scanner.collect::<io::Result<Vec<_>>>()?)
    }

    /// Rescan the open file without modifying it
    pub fn verify(&mut self) -> Result<ScanReport> {
        let file = self.file.as_mut().ok_or(StoreError::NotOpen)?;
        Ok(record::validate(file)?)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Replace the store contents with a single record for `key`
    ///
    /// Existing records for `key` are deleted first, then the new record is
    /// committed as the whole new file. Records under other keys do not
    /// survive a `set`; use `append` to keep them.
    pub fn set(&mut self, key: u16, value: &[u8]) -> Result<()> {
        let record = Record::new(key, Bytes::copy_from_slice(value))?;

        match self.delete(key, Occurrence::All) {
            Ok(()) | Err(StoreError::NotFound) => {}
            Err(e) => return Err(e),
        }

        let (swap, ()) = fill_swap(&self.paths.swap, |swap| swap.write_record(&record))?;
        self.commit(swap)?;

        tracing::debug!("set key={:#06x} ({} bytes)", key, value.len());
        Ok(())
    }

    /// Same as `set`
    pub fn add(&mut self, key: u16, value: &[u8]) -> Result<()> {
        self.set(key, value)
    }

    /// Add a value after all existing records, keeping everything else
    ///
    /// The new value becomes the highest index for `key`. A partial record
    /// at the end of the live file is dropped by the rewrite.
    pub fn append(&mut self, key: u16, value: &[u8]) -> Result<()> {
        let record = Record::new(key, Bytes::copy_from_slice(value))?;

        let file = self.file.as_mut().ok_or(StoreError::NotOpen)?;
        let (swap, ()) = fill_swap(&self.paths.swap, |swap| {
            for existing in RecordScanner::new(file)? {
                swap.write_record(&existing?)?;
            }
            swap.write_record(&record)
        })?;
        self.commit(swap)?;

        tracing::debug!("append key={:#06x} ({} bytes)", key, value.len());
        Ok(())
    }

    /// Delete occurrences of `key`
    ///
    /// The live file is rewritten without the selected records and swapped
    /// in even when nothing matched, in which case `NotFound` is returned
    /// after the commit. If a record that must be kept is cut short, the
    /// rewrite is abandoned, the live file stays as it was, and the result
    /// is `NotFound`.
    pub fn delete(&mut self, key: u16, occurrence: Occurrence) -> Result<()> {
        let file = self.file.as_mut().ok_or(StoreError::NotOpen)?;
        let (swap, rewrite) = fill_swap(&self.paths.swap, |swap| {
            copy_except(file, swap, key, occurrence)
        })?;

        let removed = match rewrite {
            Rewrite::Complete { removed } => removed,
            Rewrite::Aborted { valid_bytes } => {
                tracing::warn!(
                    "Abandoned delete of key={:#06x}: {:?} is truncated at byte {}",
                    key,
                    self.paths.data,
                    valid_bytes
                );
                swap.discard();
                return Err(StoreError::NotFound);
            }
        };

        let kept = swap.record_count();
        self.commit(swap)?;

        tracing::debug!(
            "delete key={:#06x} {:?}: removed {}, kept {}",
            key,
            occurrence,
            removed,
            kept
        );

        if removed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Delete every record with `key`
    pub fn delete_all(&mut self, key: u16) -> Result<()> {
        self.delete(key, Occurrence::All)
    }

    /// Remove the store file from disk
    ///
    /// A missing file is fine. The open handle, if any, is left alone and
    /// still reads the removed file. Call `deinit` and `init` before the next
    /// write: `set`, `append` or `delete` on the old handle rebuilds the store
    /// from it and writes the wiped records back to disk.
    pub fn wipe(&self) -> Result<()> {
        for path in [&self.paths.data, &self.paths.swap] {
            match fs::remove_file(path) {
                Ok(()) => tracing::debug!("Removed {:?}", path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Scan to the header of the `index`-th record with `key`
    fn seek_occurrence(
        &mut self,
        key: u16,
        index: usize,
    ) -> Result<Option<(RecordScanner<&mut File>, RecordHeader)>> {
        let file = self.file.as_mut().ok_or(StoreError::NotOpen)?;
        let mut scanner = RecordScanner::new(file)?;
        let mut remaining = index;

        while let Some(header) = scanner.next_header()? {
            if header.key == key {
                if remaining == 0 {
                    return Ok(Some((scanner, header)));
                }
                remaining -= 1;
            }
            if !scanner.skip_value(&header)? {
                break;
            }
        }
        Ok(None)
    }

    /// Rename the swap file into place and reopen the handle on it
    fn commit(&mut self, swap: SwapWriter) -> Result<()> {
        swap.commit(&self.paths.data, self.config.sync_strategy)?;
        // The old handle now points at the replaced file
        self.file = None;
        self.file = Some(open_store_file(&self.paths.data)?);
        Ok(())
    }
}

/// Outcome of copying the live file minus the deleted records
enum Rewrite {
    Complete { removed: usize },
    /// A record that must be kept is cut short
    Aborted { valid_bytes: u64 },
}

/// Create the swap file and fill it, removing it again if filling fails
fn fill_swap<T>(
    path: &Path,
    fill: impl FnOnce(&mut SwapWriter) -> Result<T>,
) -> Result<(SwapWriter, T)> {
    let mut swap = SwapWriter::create(path)?;
    match fill(&mut swap) {
        Ok(out) => Ok((swap, out)),
        Err(e) => {
            swap.discard();
            Err(e)
        }
    }
}

/// Copy every record of `file` into `swap` except the selected ones
fn copy_except(
    file: &mut File,
    swap: &mut SwapWriter,
    key: u16,
    occurrence: Occurrence,
) -> Result<Rewrite> {
    let mut scanner = RecordScanner::new(file)?;
    let mut seen = 0usize;
    let mut removed = 0usize;

    while let Some(header) = scanner.next_header()? {
        if header.key == key && selects(occurrence, &mut seen) {
            removed += 1;
            if !scanner.skip_value(&header)? {
                break;
            }
            continue;
        }

        swap.write_header(header)?;
        if !scanner.copy_value_to(&header, swap)? {
            return Ok(Rewrite::Aborted {
                valid_bytes: scanner.report().valid_bytes,
            });
        }
    }

    if scanner.truncation() == Some(Truncation::Header) {
        return Ok(Rewrite::Aborted {
            valid_bytes: scanner.report().valid_bytes,
        });
    }
    Ok(Rewrite::Complete { removed })
}

/// Decide whether the current occurrence of the key is removed
fn selects(occurrence: Occurrence, seen: &mut usize) -> bool {
    match occurrence {
        Occurrence::All => true,
        Occurrence::Nth(n) => {
            let hit = *seen == n;
            *seen += 1;
            hit
        }
    }
}

/// Open read-write, creating with owner-only permissions
fn open_store_file(path: &Path) -> Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options.open(path).map_err(|source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    })
}

//! Record Scanner
//!
//! Walks a store file front to back, one record at a time.
//!
//! A short read never surfaces as an error: the scanner stops, remembers
//! where the data ran out, and reports end of file. Only genuine I/O
//! failures are returned as `Err`.

use std::io::{self, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};

use bytes::Bytes;

use super::{Record, RecordHeader, HEADER_SIZE};

/// Where a scan ran out of bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truncation {
    /// Fewer than four bytes left for the next header
    Header,
    /// Header present, value cut short
    Value,
}

/// Outcome of a full validation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanReport {
    /// Complete records found
    pub records: u64,
    /// Bytes covered by complete records
    pub valid_bytes: u64,
    /// File size when the scan started
    pub file_size: u64,
    /// Whether a partial record trails the valid data
    pub truncated: bool,
}

/// Sequential reader over the records of a store file
pub struct RecordScanner<R> {
    reader: BufReader<R>,
    /// Offset of the next unread byte
    position: u64,
    /// Size snapshot taken when the scan started
    size: u64,
    /// End of the last complete record
    valid_end: u64,
    records: u64,
    truncation: Option<Truncation>,
}

impl<R: Read + Seek> RecordScanner<R> {
    /// Start a scan at offset 0
    pub fn new(mut inner: R) -> io::Result<Self> {
        let size = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;

        Ok(Self {
            reader: BufReader::new(inner),
            position: 0,
            size,
            valid_end: 0,
            records: 0,
            truncation: None,
        })
    }

    /// Read the next header
    ///
    /// Returns `Ok(None)` at end of data, including when the remaining
    /// bytes are too few to form a header.
    pub fn next_header(&mut self) -> io::Result<Option<RecordHeader>> {
        if self.truncation.is_some() || self.position >= self.size {
            return Ok(None);
        }

        let mut bytes = [0u8; HEADER_SIZE];
        if !self.read_or_truncate(&mut bytes, Truncation::Header)? {
            return Ok(None);
        }
        self.position += HEADER_SIZE as u64;

        let header = RecordHeader::decode(&bytes);
        tracing::trace!(
            "record key={:#06x} length={} at offset {}",
            header.key,
            header.length,
            self.position - HEADER_SIZE as u64
        );
        Ok(Some(header))
    }

    /// Whether all value bytes of `header` are present in the file
    pub fn value_available(&self, header: &RecordHeader) -> bool {
        self.position + u64::from(header.length) <= self.size
    }

    /// Skip over the value of the record whose header was just read
    ///
    /// Returns false if the value runs past the end of the file.
    pub fn skip_value(&mut self, header: &RecordHeader) -> io::Result<bool> {
        if !self.value_available(header) {
            self.truncation = Some(Truncation::Value);
            return Ok(false);
        }

        self.reader.seek_relative(i64::from(header.length))?;
        self.complete_record(header);
        Ok(true)
    }

    /// Read the whole value of the record whose header was just read
    pub fn read_value(&mut self, header: &RecordHeader) -> io::Result<Option<Vec<u8>>> {
        if !self.value_available(header) {
            self.truncation = Some(Truncation::Value);
            return Ok(None);
        }

        let mut value = vec![0u8; usize::from(header.length)];
        if !self.read_or_truncate(&mut value, Truncation::Value)? {
            return Ok(None);
        }
        self.complete_record(header);
        Ok(Some(value))
    }

    /// Read up to `buf.len()` bytes of the value, skipping the rest
    ///
    /// Returns false if the value runs past the end of the file.
    pub fn read_value_into(&mut self, header: &RecordHeader, buf: &mut [u8]) -> io::Result<bool> {
        if !self.value_available(header) {
            self.truncation = Some(Truncation::Value);
            return Ok(false);
        }

        let wanted = usize::from(header.length).min(buf.len());
        if !self.read_or_truncate(&mut buf[..wanted], Truncation::Value)? {
            return Ok(false);
        }

        let rest = usize::from(header.length) - wanted;
        self.reader.seek_relative(rest as i64)?;
        self.complete_record(header);
        Ok(true)
    }

    /// Stream the value into `out`
    ///
    /// Returns false if fewer than `header.length` bytes could be read; `out`
    /// then holds a partial value and must be discarded.
    pub fn copy_value_to<W: Write>(&mut self, header: &RecordHeader, out: &mut W) -> io::Result<bool> {
        let expected = u64::from(header.length);
        let copied = io::copy(&mut (&mut self.reader).take(expected), out)?;
        if copied < expected {
            self.truncation = Some(Truncation::Value);
            return Ok(false);
        }
        self.complete_record(header);
        Ok(true)
    }

    /// Where the scan ran out of bytes, if it did
    pub fn truncation(&self) -> Option<Truncation> {
        self.truncation
    }

    pub fn report(&self) -> ScanReport {
        ScanReport {
            records: self.records,
            valid_bytes: self.valid_end,
            file_size: self.size,
            truncated: self.truncation.is_some(),
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// read_exact, folding EOF into a truncation marker
    fn read_or_truncate(&mut self, buf: &mut [u8], kind: Truncation) -> io::Result<bool> {
        match self.reader.read_exact(buf) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                self.truncation = Some(kind);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn complete_record(&mut self, header: &RecordHeader) {
        self.position += u64::from(header.length);
        self.valid_end = self.position;
        self.records += 1;
    }
}

/// Yields every complete record, stopping silently at a truncated tail
impl<R: Read + Seek> Iterator for RecordScanner<R> {
    type Item = io::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let header = match self.next_header() {
            Ok(Some(header)) => header,
            Ok(None) => return None,
            Err(e) => return Some(Err(e)),
        };

        match self.read_value(&header) {
            Ok(Some(value)) => Some(Ok(Record {
                key: header.key,
                value: Bytes::from(value),
            })),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Scan a whole file once, checking that it is walkable
///
/// Nothing is modified; a trailing partial record only shows up as
/// `truncated` in the report.
pub fn validate<R: Read + Seek>(inner: R) -> io::Result<ScanReport> {
    let mut scanner = RecordScanner::new(inner)?;
    while let Some(header) = scanner.next_header()? {
        if !scanner.skip_value(&header)? {
            break;
        }
    }
    Ok(scanner.report())
}

//! Remote ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) in the archive tail
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Read the Central Directory to get metadata for all files
//! 4. For extraction, read each file's Local File Header to find its data
//!
//! Only the tail, the central directory and per-entry headers are ever
//! requested, which keeps multi-gigabyte archives cheap to index over HTTP.

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{RemoteZipError, Result, hex_preview};
use crate::index::ArchiveIndex;
use crate::io::ReadAt;

use super::central_directory::parse_central_directory;
use super::locator::locate_central_directory;
use super::structures::*;

/// Low-level ZIP file parser.
///
/// Generic over the reader type to support both local files and HTTP
/// sources. Typically used through [`crate::RemoteZip`] rather than directly.
///
/// ## Example
///
/// ```ignore
/// let parser = ZipParser::new(reader);
/// let index = parser.build_index(DEFAULT_TAIL_SIZE).await?;
/// for entry in index.entries() {
///     let offset = parser.data_offset(entry).await?;
///     // Read file data from offset...
/// }
/// ```
pub struct ZipParser<R: ReadAt + ?Sized> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt + ?Sized> ZipParser<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Build the entry index for the archive.
    ///
    /// Fetches the last `tail_size` bytes, locates the central directory
    /// (ZIP64 aware), fetches it unless it already sits inside the tail, and
    /// parses every record.
    ///
    /// # Errors
    ///
    /// Any structural problem is fatal: a partially parsed directory would
    /// map paths to wrong offsets, so no partial index is ever returned.
    pub async fn build_index(&self, tail_size: u64) -> Result<ArchiveIndex> {
        let (location, tail) = locate_central_directory(self.reader.as_ref(), tail_size).await?;

        let cd_len = usize::try_from(location.cd_size).map_err(|_| {
            RemoteZipError::CorruptCentralDirectory {
                offset: location.cd_offset,
                parsed: 0,
                reason: format!("central directory size {} is not addressable", location.cd_size),
                found_hex: String::new(),
            }
        })?;

        let fetched;
        let cd_data = match tail.slice(location.cd_offset, location.cd_size) {
            Some(data) => {
                debug!(cd_size = location.cd_size, "central directory found inside tail");
                data
            }
            None => {
                // Read the entire Central Directory in one request
                fetched = self.reader.read_exact_at(location.cd_offset, cd_len).await?;
                fetched.as_slice()
            }
        };

        let scan = parse_central_directory(cd_data, location.total_entries).check(location.cd_offset)?;

        for (parsed, entry) in scan.entries.iter().enumerate() {
            self.check_descriptor(entry, location.cd_offset, parsed)?;
        }

        info!(
            url = self.reader.source(),
            entries = scan.entries.len(),
            declared = location.total_entries,
            zip64 = location.zip64,
            "built archive index"
        );

        Ok(ArchiveIndex::new(self.reader.handle(), location, scan.entries))
    }

    /// Entry data must end before the central directory starts.
    fn check_descriptor(&self, entry: &EntryDescriptor, cd_offset: u64, parsed: usize) -> Result<()> {
        let end = entry
            .local_header_offset
            .checked_add(LFH_SIZE as u64 + entry.name_length as u64)
            .and_then(|v| v.checked_add(entry.compressed_size));

        match end {
            Some(end) if end <= cd_offset && end <= self.size => Ok(()),
            _ => Err(RemoteZipError::CorruptCentralDirectory {
                offset: entry.local_header_offset,
                parsed,
                reason: format!(
                    "entry {:?} ({} compressed bytes at {}) runs past the central directory at {}",
                    entry.path, entry.compressed_size, entry.local_header_offset, cd_offset
                ),
                found_hex: String::new(),
            }),
        }
    }

    /// Resolve the absolute offset where an entry's compressed data starts.
    ///
    /// The local header's name and extra-field lengths can differ from the
    /// central directory's copy (extra-field padding is common), so the 30
    /// byte local header is always fetched.
    pub async fn data_offset(&self, entry: &EntryDescriptor) -> Result<u64> {
        let header = self
            .reader
            .read_exact_at(entry.local_header_offset, LFH_SIZE)
            .await?;

        let invalid = |reason: String| RemoteZipError::InvalidLocalHeader {
            path: entry.path.clone(),
            offset: entry.local_header_offset,
            reason,
        };

        let lengths = LocalHeaderLengths::from_bytes(&header)?
            .ok_or_else(|| invalid(format!("bad signature: {}", hex_preview(&header, 8))))?;

        // Data starts after: LFH (30 bytes) + filename + extra field
        let data_offset = entry.local_header_offset + lengths.header_len();

        if data_offset
            .checked_add(entry.compressed_size)
            .is_none_or(|end| end > self.size)
        {
            return Err(invalid(format!(
                "data [{}+{}] runs past the {} byte archive",
                data_offset, entry.compressed_size, self.size
            )));
        }

        Ok(data_offset)
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

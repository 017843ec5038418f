//! Central directory parsing.
//!
//! Records are walked from the start of the directory buffer. The walk stops
//! at the first record with a bad signature or one that would run past the
//! buffer, and the stop reason is kept alongside the entries parsed so far
//! so callers never mistake a damaged directory for a small one.

use tracing::warn;

use crate::error::{OutOfBounds, RemoteZipError, hex_preview};

use super::cursor::ByteCursor;
use super::structures::*;

const HEX_PREVIEW_LEN: usize = 48;

/// Why the central directory walk ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStop {
    /// The number of entries declared by the EOCD was reached
    Complete,
    /// The buffer ended exactly on a record boundary
    Exhausted,
    /// A record did not start with `PK\x01\x02`
    BadSignature { offset: usize, found_hex: String },
    /// A record's fixed or variable fields run past the buffer
    Truncated { offset: usize, found_hex: String },
}

/// Result of walking the central directory.
#[derive(Debug, Clone)]
pub struct CentralDirectoryScan {
    pub entries: Vec<EntryDescriptor>,
    pub expected: u64,
    pub stop: ScanStop,
}

impl CentralDirectoryScan {
    /// Whether the walk ended on damaged data rather than a clean boundary.
    pub fn is_damaged(&self) -> bool {
        matches!(
            self.stop,
            ScanStop::BadSignature { .. } | ScanStop::Truncated { .. }
        )
    }

    /// Convert a damaged walk into an error positioned in the archive.
    ///
    /// `cd_offset` is the absolute offset of the directory buffer.
    pub fn check(self, cd_offset: u64) -> Result<Self, RemoteZipError> {
        let parsed = self.entries.len();
        match &self.stop {
            ScanStop::BadSignature { offset, found_hex } => {
                Err(RemoteZipError::CorruptCentralDirectory {
                    offset: cd_offset + *offset as u64,
                    parsed,
                    reason: "bad central directory header signature".to_string(),
                    found_hex: found_hex.clone(),
                })
            }
            ScanStop::Truncated { offset, found_hex } => Err(RemoteZipError::TruncatedEntry {
                offset: cd_offset + *offset as u64,
                parsed,
                expected: self.expected,
                found_hex: found_hex.clone(),
            }),
            ScanStop::Complete | ScanStop::Exhausted => {
                if parsed as u64 != self.expected {
                    warn!(
                        parsed,
                        expected = self.expected,
                        "central directory entry count differs from end of central directory"
                    );
                }
                Ok(self)
            }
        }
    }
}

/// Walk the central directory buffer `data`, expecting `expected` records.
pub fn parse_central_directory(data: &[u8], expected: u64) -> CentralDirectoryScan {
    // Each record takes at least 46 bytes, so this caps a bogus count
    let capacity = expected.min((data.len() / CDFH_MIN_SIZE) as u64) as usize;
    let mut entries = Vec::with_capacity(capacity);
    let mut pos = 0usize;

    let stop = loop {
        if entries.len() as u64 == expected {
            break ScanStop::Complete;
        }
        if pos == data.len() {
            break ScanStop::Exhausted;
        }

        let preview = || hex_preview(&data[pos..], HEX_PREVIEW_LEN);

        if data.len() - pos < CDFH_MIN_SIZE {
            if !data[pos..].starts_with(&CDFH_SIGNATURE[..(data.len() - pos).min(4)]) {
                break ScanStop::BadSignature {
                    offset: pos,
                    found_hex: preview(),
                };
            }
            break ScanStop::Truncated {
                offset: pos,
                found_hex: preview(),
            };
        }

        if &data[pos..pos + 4] != CDFH_SIGNATURE {
            break ScanStop::BadSignature {
                offset: pos,
                found_hex: preview(),
            };
        }

        match parse_record(data, pos) {
            Ok(Some((entry, next))) => {
                entries.push(entry);
                pos = next;
            }
            Ok(None) | Err(_) => {
                break ScanStop::Truncated {
                    offset: pos,
                    found_hex: preview(),
                };
            }
        }
    };

    CentralDirectoryScan {
        entries,
        expected,
        stop,
    }
}

/// Parse one record at `pos`. Returns `None` when its variable-length
/// fields extend past the buffer.
fn parse_record(data: &[u8], pos: usize) -> Result<Option<(EntryDescriptor, usize)>, OutOfBounds> {
    let mut cursor = ByteCursor::at(data, pos + 4);

    let _version_made_by = cursor.u16()?;
    let _version_needed = cursor.u16()?;
    let flags = cursor.u16()?;
    let compression_method = cursor.u16()?;
    let last_mod_time = cursor.u16()?;
    let last_mod_date = cursor.u16()?;
    let crc32 = cursor.u32()?;
    let compressed_size = cursor.u32()?;
    let uncompressed_size = cursor.u32()?;
    let file_name_length = cursor.u16()? as usize;
    let extra_field_length = cursor.u16()? as usize;
    let file_comment_length = cursor.u16()? as usize;
    let _disk_number_start = cursor.u16()?;
    let _internal_attrs = cursor.u16()?;
    let _external_attrs = cursor.u32()?;
    let lfh_offset = cursor.u32()?;

    let next = pos + CDFH_MIN_SIZE + file_name_length + extra_field_length + file_comment_length;
    if next > data.len() {
        return Ok(None);
    }

    // Use lossy conversion to handle non-UTF8 filenames gracefully
    let file_name = String::from_utf8_lossy(cursor.bytes(file_name_length)?).into_owned();
    let extra = cursor.bytes(extra_field_length)?;

    let (uncompressed_size, compressed_size, lfh_offset) =
        apply_zip64_extra(extra, uncompressed_size, compressed_size, lfh_offset);

    let is_directory = file_name.ends_with('/');

    Ok(Some((
        EntryDescriptor {
            path: file_name,
            compression_method: CompressionMethod::from_u16(compression_method),
            compressed_size,
            uncompressed_size,
            local_header_offset: lfh_offset,
            crc32,
            name_length: file_name_length as u16,
            flags,
            last_mod_time,
            last_mod_date,
            is_directory,
        },
        next,
    )))
}

/// Replace sentinel 32-bit fields with values from the ZIP64 extra field.
///
/// Fields appear in the extra block only when the corresponding header
/// field is `0xFFFFFFFF`, in the order uncompressed, compressed, offset.
fn apply_zip64_extra(extra: &[u8], uncompressed: u32, compressed: u32, offset: u32) -> (u64, u64, u64) {
    let mut uncompressed_size = uncompressed as u64;
    let mut compressed_size = compressed as u64;
    let mut lfh_offset = offset as u64;

    let mut cursor = ByteCursor::new(extra);
    while cursor.remaining() >= 4 {
        let (Ok(header_id), Ok(field_size)) = (cursor.u16(), cursor.u16()) else {
            break;
        };
        let Ok(field) = cursor.bytes((field_size as usize).min(cursor.remaining())) else {
            break;
        };
        if header_id != ZIP64_EXTRA_ID {
            continue;
        }

        let mut field = ByteCursor::new(field);
        if uncompressed == ZIP32_SENTINEL_U32 {
            if let Ok(v) = field.u64() {
                uncompressed_size = v;
            }
        }
        if compressed == ZIP32_SENTINEL_U32 {
            if let Ok(v) = field.u64() {
                compressed_size = v;
            }
        }
        if offset == ZIP32_SENTINEL_U32 {
            if let Ok(v) = field.u64() {
                lfh_offset = v;
            }
        }
        break;
    }

    (uncompressed_size, compressed_size, lfh_offset)
}

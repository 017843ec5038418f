//! End of central directory location.
//!
//! Only the archive tail is fetched. The EOCD is found by scanning backward
//! from `len - 22`, because a trailing archive comment shifts it by an
//! unknown amount. When the EOCD carries ZIP32 sentinels the ZIP64 locator
//! immediately in front of it points at the ZIP64 record holding the real
//! 64-bit values.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{RemoteZipError, Result, hex_preview};
use crate::io::ReadAt;

use super::structures::{EndOfCentralDirectory, Zip64EOCD, Zip64EOCDLocator};

const HEX_PREVIEW_LEN: usize = 32;

/// Where the central directory lives, as declared by the archive trailer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CentralDirectoryLocation {
    pub cd_offset: u64,
    pub cd_size: u64,
    pub total_entries: u64,
    pub zip64: bool,
    /// Absolute offset of the (ZIP32) EOCD record
    pub eocd_offset: u64,
}

/// Archive tail fetched while locating the EOCD. Kept so a central directory
/// that fits inside it does not need a second request.
pub struct Tail {
    pub start: u64,
    pub data: Vec<u8>,
}

impl Tail {
    /// Borrow `[offset, offset + len)` if it lies entirely in the tail.
    pub fn slice(&self, offset: u64, len: u64) -> Option<&[u8]> {
        let rel = offset.checked_sub(self.start)? as usize;
        let end = rel.checked_add(usize::try_from(len).ok()?)?;
        self.data.get(rel..end)
    }
}

/// Scan `tail` backward for the EOCD signature.
///
/// A candidate whose comment length reaches exactly to the end of the buffer
/// wins. Failing that, the candidate closest to the end whose comment still
/// fits is used, which tolerates junk appended after the archive.
///
/// Returns the parsed record and its position within `tail`.
pub fn find_eocd(tail: &[u8]) -> Result<(EndOfCentralDirectory, usize)> {
    let size = EndOfCentralDirectory::SIZE;
    if tail.len() < size {
        return Err(RemoteZipError::NotAZip {
            searched: tail.len(),
            tail_hex: hex_preview(tail, HEX_PREVIEW_LEN),
        });
    }

    let mut fallback = None;
    for i in (0..=tail.len() - size).rev() {
        if &tail[i..i + 4] != EndOfCentralDirectory::SIGNATURE {
            continue;
        }
        let eocd = EndOfCentralDirectory::from_bytes(&tail[i..i + size])?;
        let comment_end = i + size + eocd.comment_len as usize;

        if comment_end == tail.len() {
            return Ok((eocd, i));
        }
        if comment_end < tail.len() && fallback.is_none() {
            fallback = Some((eocd, i));
        }
    }

    match fallback {
        Some((eocd, i)) => {
            warn!(
                position = i,
                trailing = tail.len() - i - size - eocd.comment_len as usize,
                "EOCD comment length does not reach end of archive, using nearest candidate"
            );
            Ok((eocd, i))
        }
        None => {
            let from = tail.len().saturating_sub(HEX_PREVIEW_LEN);
            Err(RemoteZipError::NotAZip {
                searched: tail.len(),
                tail_hex: hex_preview(&tail[from..], HEX_PREVIEW_LEN),
            })
        }
    }
}

/// Fetch the archive tail and resolve the central directory location,
/// following the ZIP64 locator when the EOCD holds sentinel values.
pub async fn locate_central_directory<R: ReadAt + ?Sized>(
    reader: &R,
    tail_size: u64,
) -> Result<(CentralDirectoryLocation, Tail)> {
    let archive_len = reader.size();
    let tail_len = tail_size.min(archive_len);
    let tail_start = archive_len - tail_len;
    let data = reader.read_exact_at(tail_start, tail_len as usize).await?;
    let tail = Tail {
        start: tail_start,
        data,
    };

    let (eocd, pos) = find_eocd(&tail.data)?;
    let eocd_offset = tail_start + pos as u64;
    debug!(
        eocd_offset,
        total_entries = eocd.total_entries,
        cd_offset = eocd.cd_offset,
        cd_size = eocd.cd_size,
        "found end of central directory"
    );

    let location = if eocd.is_zip64() {
        let eocd64 = read_zip64_eocd(reader, &tail, eocd_offset).await?;
        CentralDirectoryLocation {
            cd_offset: eocd64.cd_offset,
            cd_size: eocd64.cd_size,
            total_entries: eocd64.total_entries,
            zip64: true,
            eocd_offset,
        }
    } else {
        CentralDirectoryLocation {
            cd_offset: eocd.cd_offset as u64,
            cd_size: eocd.cd_size as u64,
            total_entries: eocd.total_entries as u64,
            zip64: false,
            eocd_offset,
        }
    };

    // The directory must end before the trailer that describes it
    let cd_end = location.cd_offset.checked_add(location.cd_size);
    if cd_end.is_none_or(|end| end > eocd_offset) {
        return Err(RemoteZipError::CorruptCentralDirectory {
            offset: location.cd_offset,
            parsed: 0,
            reason: format!(
                "central directory [{}+{}] overlaps the end of central directory at {}",
                location.cd_offset, location.cd_size, eocd_offset
            ),
            found_hex: hex_preview(&tail.data[pos..], HEX_PREVIEW_LEN),
        });
    }

    Ok((location, tail))
}

/// Read the ZIP64 locator in front of the EOCD and the record it points to.
async fn read_zip64_eocd<R: ReadAt + ?Sized>(
    reader: &R,
    tail: &Tail,
    eocd_offset: u64,
) -> Result<Zip64EOCD> {
    let Some(locator_offset) = eocd_offset.checked_sub(Zip64EOCDLocator::SIZE as u64) else {
        return Err(RemoteZipError::Zip64LocatorMismatch {
            offset: 0,
            found_hex: String::new(),
        });
    };

    let locator_bytes = match tail.slice(locator_offset, Zip64EOCDLocator::SIZE as u64) {
        Some(bytes) => bytes.to_vec(),
        None => {
            reader
                .read_exact_at(locator_offset, Zip64EOCDLocator::SIZE)
                .await?
        }
    };

    let locator = Zip64EOCDLocator::from_bytes(&locator_bytes)?.ok_or_else(|| {
        RemoteZipError::Zip64LocatorMismatch {
            offset: locator_offset,
            found_hex: hex_preview(&locator_bytes, HEX_PREVIEW_LEN),
        }
    })?;

    let record_offset = locator.eocd64_offset;
    let fits = record_offset
        .checked_add(Zip64EOCD::MIN_SIZE as u64)
        .is_some_and(|end| end <= locator_offset);
    if !fits {
        return Err(RemoteZipError::InvalidZip64Record {
            offset: record_offset,
            found_hex: format!("locator points past itself (locator at {})", locator_offset),
        });
    }

    let record_bytes = match tail.slice(record_offset, Zip64EOCD::MIN_SIZE as u64) {
        Some(bytes) => bytes.to_vec(),
        None => reader.read_exact_at(record_offset, Zip64EOCD::MIN_SIZE).await?,
    };

    let record =
        Zip64EOCD::from_bytes(&record_bytes)?.ok_or_else(|| RemoteZipError::InvalidZip64Record {
            offset: record_offset,
            found_hex: hex_preview(&record_bytes, HEX_PREVIEW_LEN),
        })?;

    debug!(
        record_offset,
        total_entries = record.total_entries,
        cd_offset = record.cd_offset,
        cd_size = record.cd_size,
        "read ZIP64 end of central directory"
    );
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eocd(entries: u16, cd_size: u32, cd_offset: u32, comment: &[u8]) -> Vec<u8> {
        let mut out = Vec::from(EndOfCentralDirectory::SIGNATURE);
        out.extend_from_slice(&[0, 0, 0, 0]);
        out.extend_from_slice(&entries.to_le_bytes());
        out.extend_from_slice(&entries.to_le_bytes());
        out.extend_from_slice(&cd_size.to_le_bytes());
        out.extend_from_slice(&cd_offset.to_le_bytes());
        out.extend_from_slice(&(comment.len() as u16).to_le_bytes());
        out.extend_from_slice(comment);
        out
    }

    #[test]
    fn finds_record_at_end() {
        let mut data = vec![0u8; 100];
        data.extend(eocd(3, 40, 60, b""));
        let (record, pos) = find_eocd(&data).unwrap();
        assert_eq!(pos, 100);
        assert_eq!(record.total_entries, 3);
        assert_eq!(record.cd_offset, 60);
    }

    #[test]
    fn finds_record_before_comment() {
        let mut data = vec![0u8; 50];
        data.extend(eocd(1, 10, 5, b"exported by takeout"));
        let (record, pos) = find_eocd(&data).unwrap();
        assert_eq!(pos, 50);
        assert_eq!(record.comment_len, 19);
    }

    #[test]
    fn comment_containing_signature_is_skipped() {
        // A fake signature inside the comment has a comment length that does not fit
        let mut comment = Vec::from(EndOfCentralDirectory::SIGNATURE);
        comment.extend_from_slice(&[0xAA; 30]);
        let mut data = vec![0u8; 20];
        data.extend(eocd(2, 10, 5, &comment));
        let (record, pos) = find_eocd(&data).unwrap();
        assert_eq!(pos, 20);
        assert_eq!(record.total_entries, 2);
    }

    #[test]
    fn trailing_junk_falls_back_to_nearest() {
        let mut data = vec![0u8; 10];
        data.extend(eocd(4, 1, 1, b""));
        data.extend_from_slice(&[0x11; 7]);
        let (record, pos) = find_eocd(&data).unwrap();
        assert_eq!(pos, 10);
        assert_eq!(record.total_entries, 4);
    }

    #[test]
    fn missing_signature_is_not_a_zip() {
        let data = vec![0x42u8; 500];
        match find_eocd(&data) {
            Err(RemoteZipError::NotAZip { searched, tail_hex }) => {
                assert_eq!(searched, 500);
                assert!(tail_hex.starts_with("42 42"));
            }
            other => panic!("unexpected result: {:?}", other.map(|(_, p)| p)),
        }
        assert!(matches!(find_eocd(b"PK"), Err(RemoteZipError::NotAZip { .. })));
    }

    #[test]
    fn tail_slice_bounds() {
        let tail = Tail {
            start: 100,
            data: vec![7u8; 50],
        };
        assert_eq!(tail.slice(100, 50).map(|s| s.len()), Some(50));
        assert_eq!(tail.slice(120, 10).map(|s| s.len()), Some(10));
        assert!(tail.slice(99, 10).is_none());
        assert!(tail.slice(140, 11).is_none());
    }
}

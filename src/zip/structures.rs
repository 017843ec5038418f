use serde::Serialize;

use super::cursor::ByteCursor;
use crate::error::OutOfBounds;

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

impl Serialize for CompressionMethod {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.as_u16())
    }
}

pub const ZIP32_SENTINEL_U16: u16 = 0xFFFF;
pub const ZIP32_SENTINEL_U32: u32 = 0xFFFF_FFFF;

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    /// Parse the fixed part of the record. The caller has already matched
    /// the signature at the start of `data`.
    pub fn from_bytes(data: &[u8]) -> Result<Self, OutOfBounds> {
        let mut cursor = ByteCursor::at(data, 4);

        Ok(Self {
            disk_number: cursor.u16()?,
            disk_with_cd: cursor.u16()?,
            disk_entries: cursor.u16()?,
            total_entries: cursor.u16()?,
            cd_size: cursor.u32()?,
            cd_offset: cursor.u32()?,
            comment_len: cursor.u16()?,
        })
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == ZIP32_SENTINEL_U16
            || self.total_entries == ZIP32_SENTINEL_U16
            || self.cd_size == ZIP32_SENTINEL_U32
            || self.cd_offset == ZIP32_SENTINEL_U32
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    /// Parse a locator, returning `None` when the signature does not match.
    pub fn from_bytes(data: &[u8]) -> Result<Option<Self>, OutOfBounds> {
        let mut cursor = ByteCursor::new(data);
        if !cursor.signature(Self::SIGNATURE)? {
            return Ok(None);
        }

        Ok(Some(Self {
            disk_with_eocd64: cursor.u32()?,
            eocd64_offset: cursor.u64()?,
            total_disks: cursor.u32()?,
        }))
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zip64EOCD {
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    /// Parse the record, returning `None` when the signature does not match.
    pub fn from_bytes(data: &[u8]) -> Result<Option<Self>, OutOfBounds> {
        let mut cursor = ByteCursor::new(data);
        if !cursor.signature(Self::SIGNATURE)? {
            return Ok(None);
        }

        Ok(Some(Self {
            eocd64_size: cursor.u64()?,
            version_made_by: cursor.u16()?,
            version_needed: cursor.u16()?,
            disk_number: cursor.u32()?,
            disk_with_cd: cursor.u32()?,
            disk_entries: cursor.u64()?,
            total_entries: cursor.u64()?,
            cd_size: cursor.u64()?,
            cd_offset: cursor.u64()?,
        }))
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// ZIP64 extended information extra field
pub const ZIP64_EXTRA_ID: u16 = 0x0001;

/// General purpose flag: entry is encrypted
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// Variable-length field sizes read from a local file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalHeaderLengths {
    pub file_name_length: u16,
    pub extra_field_length: u16,
}

impl LocalHeaderLengths {
    /// Parse the fixed 30-byte local header, returning `None` on a bad signature.
    pub fn from_bytes(data: &[u8]) -> Result<Option<Self>, OutOfBounds> {
        let mut cursor = ByteCursor::new(data);
        if !cursor.signature(LFH_SIGNATURE)? {
            return Ok(None);
        }
        // version, flags, method, time, date, crc32, sizes
        cursor.skip(22)?;

        Ok(Some(Self {
            file_name_length: cursor.u16()?,
            extra_field_length: cursor.u16()?,
        }))
    }

    /// Bytes between the local header offset and the entry data.
    pub fn header_len(&self) -> u64 {
        LFH_SIZE as u64 + self.file_name_length as u64 + self.extra_field_length as u64
    }
}

/// One central directory record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDescriptor {
    pub path: String,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub local_header_offset: u64,
    pub crc32: u32,
    /// Raw length of the name in the central directory record
    #[serde(skip)]
    pub name_length: u16,
    #[serde(skip)]
    pub flags: u16,
    #[serde(skip)]
    pub last_mod_time: u16,
    #[serde(skip)]
    pub last_mod_date: u16,
    pub is_directory: bool,
}

impl EntryDescriptor {
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Final path component.
    pub fn basename(&self) -> &str {
        basename(&self.path)
    }

    /// Lower-cased extension of the final path component, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.basename();
        name.rsplit_once('.')
            .filter(|(stem, _)| !stem.is_empty())
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }

    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }
}

pub fn basename(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(path: &str) -> EntryDescriptor {
        EntryDescriptor {
            path: path.to_string(),
            compression_method: CompressionMethod::Stored,
            compressed_size: 0,
            uncompressed_size: 0,
            local_header_offset: 0,
            crc32: 0,
            name_length: path.len() as u16,
            flags: 0,
            last_mod_time: 0x6B5A,
            last_mod_date: 0x5A8F,
            is_directory: path.ends_with('/'),
        }
    }

    #[test]
    fn extension_and_basename() {
        assert_eq!(descriptor("a/b/Index.HTML").extension().as_deref(), Some("html"));
        assert_eq!(descriptor("a/.hidden").extension(), None);
        assert_eq!(descriptor("noext").extension(), None);
        assert_eq!(descriptor("a/b/").basename(), "b");
        assert_eq!(descriptor("top.json").basename(), "top.json");
    }

    #[test]
    fn dos_timestamp() {
        let d = descriptor("x");
        assert_eq!(d.mod_date(), (2025, 4, 15));
        assert_eq!(d.mod_time(), (13, 26, 52));
    }

    #[test]
    fn eocd_sentinels() {
        let mut record = Vec::from(EndOfCentralDirectory::SIGNATURE);
        record.extend_from_slice(&[0, 0, 0, 0]);
        record.extend_from_slice(&0xFFFFu16.to_le_bytes());
        record.extend_from_slice(&0xFFFFu16.to_le_bytes());
        record.extend_from_slice(&100u32.to_le_bytes());
        record.extend_from_slice(&200u32.to_le_bytes());
        record.extend_from_slice(&0u16.to_le_bytes());

        let eocd = EndOfCentralDirectory::from_bytes(&record).unwrap();
        assert_eq!(eocd.cd_size, 100);
        assert_eq!(eocd.cd_offset, 200);
        assert!(eocd.is_zip64());
    }

    #[test]
    fn local_header_lengths() {
        let mut header = Vec::from(LFH_SIGNATURE);
        header.extend_from_slice(&[0u8; 22]);
        header.extend_from_slice(&5u16.to_le_bytes());
        header.extend_from_slice(&9u16.to_le_bytes());

        let lengths = LocalHeaderLengths::from_bytes(&header).unwrap().unwrap();
        assert_eq!(lengths.header_len(), 30 + 5 + 9);

        header[0] = b'X';
        assert_eq!(LocalHeaderLengths::from_bytes(&header).unwrap(), None);
    }
}

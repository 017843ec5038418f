//! Error types for remotezip.
//!
//! Index-build failures (transport, EOCD, ZIP64 locator, central directory)
//! carry byte offsets and a hex dump of the failing region so a broken
//! archive can be diagnosed without downloading it again. Per-entry failures
//! are reported through [`RemoteZipError::reason_code`] in batch and
//! materialization results.

use thiserror::Error;

/// Result type for remotezip operations
pub type Result<T> = std::result::Result<T, RemoteZipError>;

/// A read that ran past the end of a byte buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("read of {needed} bytes at offset {offset} exceeds buffer of {len} bytes")]
pub struct OutOfBounds {
    pub offset: usize,
    pub needed: usize,
    pub len: usize,
}

#[derive(Error, Debug)]
pub enum RemoteZipError {
    /// HEAD or range request failed, or the server does not honor ranges
    #[error("transport error for {url}: {message}")]
    Transport {
        url: String,
        status: Option<u16>,
        message: String,
    },

    /// No EOCD signature in the fetched tail
    #[error("not a ZIP archive: no end of central directory in the last {searched} bytes (tail ends with {tail_hex})")]
    NotAZip { searched: usize, tail_hex: String },

    /// EOCD carries ZIP64 sentinels but the locator before it is missing
    #[error("ZIP64 locator mismatch at offset {offset}: found {found_hex}")]
    Zip64LocatorMismatch { offset: u64, found_hex: String },

    /// ZIP64 end of central directory record is missing or malformed
    #[error("invalid ZIP64 end of central directory at offset {offset}: found {found_hex}")]
    InvalidZip64Record { offset: u64, found_hex: String },

    /// A central directory record runs past the end of the directory
    #[error("truncated central directory entry at offset {offset} after {parsed} entries (expected {expected}): {found_hex}")]
    TruncatedEntry {
        offset: u64,
        parsed: usize,
        expected: u64,
        found_hex: String,
    },

    /// Central directory is inconsistent with the archive
    #[error("corrupt central directory at offset {offset} after {parsed} entries: {reason} ({found_hex})")]
    CorruptCentralDirectory {
        offset: u64,
        parsed: usize,
        reason: String,
        found_hex: String,
    },

    /// Buffer-level parse failure
    #[error("malformed record: {0}")]
    Malformed(#[from] OutOfBounds),

    #[error("entry not found: {path}")]
    EntryNotFound {
        path: String,
        similar_paths: Vec<String>,
    },

    #[error("unsupported compression method {method} for {path}")]
    UnsupportedCompression { path: String, method: u16 },

    #[error("encrypted entries are not supported: {path}")]
    EncryptedEntry { path: String },

    #[error("entry {path} is {size} bytes, above the {limit} byte limit")]
    EntryTooLarge { path: String, size: u64, limit: u64 },

    /// Local header signature or lengths do not match the descriptor
    #[error("invalid local header for {path} at offset {offset}: {reason}")]
    InvalidLocalHeader {
        path: String,
        offset: u64,
        reason: String,
    },

    #[error("decompression failed for {path}: {message}")]
    Decompress { path: String, message: String },

    #[error("CRC-32 mismatch for {path}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        path: String,
        expected: u32,
        actual: u32,
    },

    /// Text or JSON decoding of an extracted entry failed
    #[error("failed to decode {path}: {message}")]
    Decode { path: String, message: String },

    #[error("failed to store {key}: {message}")]
    StorageUpload { key: String, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteZipError {
    pub(crate) fn transport(url: &str, status: Option<u16>, message: impl Into<String>) -> Self {
        RemoteZipError::Transport {
            url: url.to_string(),
            status,
            message: message.into(),
        }
    }

    /// Stable code recorded in batch error maps and manifests.
    pub fn reason_code(&self) -> &'static str {
        match self {
            RemoteZipError::EntryNotFound { .. } => "not_found",
            RemoteZipError::EntryTooLarge { .. } => "too_large",
            RemoteZipError::UnsupportedCompression { .. } => "unsupported_compression",
            RemoteZipError::EncryptedEntry { .. } => "encrypted",
            RemoteZipError::Decode { .. } => "decode_failed",
            RemoteZipError::StorageUpload { .. } => "upload_failed",
            RemoteZipError::Transport { .. } => "transport_error",
            RemoteZipError::InvalidRequest(_) => "invalid_request",
            _ => "extraction_failed",
        }
    }

    /// Whether retrying the same work later could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteZipError::Transport { status, .. } => match status {
                Some(code) => matches!(code, 408 | 429 | 500 | 502 | 503 | 504),
                // No status means the request never completed
                None => true,
            },
            RemoteZipError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::ConnectionReset
            ),
            _ => false,
        }
    }

    /// Suggestions attached to a not-found error.
    pub fn similar_paths(&self) -> &[String] {
        match self {
            RemoteZipError::EntryNotFound { similar_paths, .. } => similar_paths,
            _ => &[],
        }
    }
}

/// Hex dump of at most `max` leading bytes, for diagnostics.
pub fn hex_preview(data: &[u8], max: usize) -> String {
    let shown = &data[..data.len().min(max)];
    let mut out = shown
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ");
    if data.len() > max {
        out.push_str(" ..");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_preview_truncates() {
        assert_eq!(hex_preview(b"PK\x05\x06", 8), "50 4b 05 06");
        assert_eq!(hex_preview(&[0xab; 10], 2), "ab ab ..");
        assert_eq!(hex_preview(&[], 4), "");
    }

    #[test]
    fn reason_codes() {
        let too_large = RemoteZipError::EntryTooLarge {
            path: "a".into(),
            size: 10,
            limit: 5,
        };
        assert_eq!(too_large.reason_code(), "too_large");

        let crc = RemoteZipError::ChecksumMismatch {
            path: "a".into(),
            expected: 1,
            actual: 2,
        };
        assert_eq!(crc.reason_code(), "extraction_failed");
    }

    #[test]
    fn gateway_errors_are_transient() {
        assert!(RemoteZipError::transport("u", Some(502), "bad gateway").is_transient());
        assert!(RemoteZipError::transport("u", None, "timed out").is_transient());
        assert!(!RemoteZipError::transport("u", Some(200), "range ignored").is_transient());
        assert!(!RemoteZipError::transport("u", Some(404), "missing").is_transient());
    }
}

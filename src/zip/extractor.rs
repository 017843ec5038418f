use flate2::Crc;
use flate2::read::DeflateDecoder;
use std::io::Read;
use std::sync::Arc;
use tracing::debug;

use crate::config::DEFAULT_MAX_ENTRY_SIZE;
use crate::error::{RemoteZipError, Result};
use crate::io::ReadAt;
use crate::payload::{Payload, ResponseType, decode_payload};

use super::parser::ZipParser;
use super::structures::{CompressionMethod, EntryDescriptor, LFH_SIZE};

/// Decompressed entry bytes plus the number of archive bytes fetched for them.
#[derive(Debug, Clone)]
pub struct ExtractedBytes {
    pub data: Vec<u8>,
    pub bytes_fetched: u64,
}

/// ZIP entry extractor
pub struct ZipExtractor<R: ReadAt + ?Sized> {
    parser: ZipParser<R>,
    max_entry_size: u64,
}

impl<R: ReadAt + ?Sized> ZipExtractor<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            parser: ZipParser::new(reader),
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
        }
    }

    /// Refuse entries whose uncompressed size exceeds `limit` bytes.
    pub fn max_entry_size(mut self, limit: u64) -> Self {
        self.max_entry_size = limit;
        self
    }

    pub fn parser(&self) -> &ZipParser<R> {
        &self.parser
    }

    /// Reject entries that cannot be extracted before any data is fetched.
    pub fn check_extractable(&self, entry: &EntryDescriptor) -> Result<()> {
        if entry.uncompressed_size > self.max_entry_size {
            return Err(RemoteZipError::EntryTooLarge {
                path: entry.path.clone(),
                size: entry.uncompressed_size,
                limit: self.max_entry_size,
            });
        }
        if entry.is_encrypted() {
            return Err(RemoteZipError::EncryptedEntry {
                path: entry.path.clone(),
            });
        }
        if let CompressionMethod::Unknown(method) = entry.compression_method {
            return Err(RemoteZipError::UnsupportedCompression {
                path: entry.path.clone(),
                method,
            });
        }
        Ok(())
    }

    /// Fetch and decompress an entry into memory.
    pub async fn extract_bytes(&self, entry: &EntryDescriptor) -> Result<ExtractedBytes> {
        self.check_extractable(entry)?;

        let data_offset = self.parser.data_offset(entry).await?;
        let compressed_len = usize::try_from(entry.compressed_size).map_err(|_| {
            RemoteZipError::EntryTooLarge {
                path: entry.path.clone(),
                size: entry.compressed_size,
                limit: self.max_entry_size,
            }
        })?;

        // Fetch exactly the compressed range in one request
        let compressed = self
            .parser
            .reader()
            .read_exact_at(data_offset, compressed_len)
            .await?;

        let data = match entry.compression_method {
            CompressionMethod::Stored => {
                if entry.compressed_size != entry.uncompressed_size {
                    return Err(RemoteZipError::Decompress {
                        path: entry.path.clone(),
                        message: format!(
                            "stored entry has compressed size {} but uncompressed size {}",
                            entry.compressed_size, entry.uncompressed_size
                        ),
                    });
                }
                compressed
            }
            CompressionMethod::Deflate => inflate(entry, &compressed)?,
            CompressionMethod::Unknown(method) => {
                return Err(RemoteZipError::UnsupportedCompression {
                    path: entry.path.clone(),
                    method,
                });
            }
        };

        let mut crc = Crc::new();
        crc.update(&data);
        if crc.sum() != entry.crc32 {
            return Err(RemoteZipError::ChecksumMismatch {
                path: entry.path.clone(),
                expected: entry.crc32,
                actual: crc.sum(),
            });
        }

        let bytes_fetched = LFH_SIZE as u64 + entry.compressed_size;
        debug!(
            path = %entry.path,
            data_offset,
            bytes_fetched,
            size = data.len(),
            "extracted entry"
        );

        Ok(ExtractedBytes {
            data,
            bytes_fetched,
        })
    }

    /// Fetch, decompress and decode an entry into the requested shape.
    pub async fn extract(&self, entry: &EntryDescriptor, shape: ResponseType) -> Result<(Payload, u64)> {
        let extracted = self.extract_bytes(entry).await?;
        let payload = decode_payload(&entry.path, extracted.data, shape)?;
        Ok((payload, extracted.bytes_fetched))
    }
}

/// Inflate raw DEFLATE data, refusing output beyond the declared size.
fn inflate(entry: &EntryDescriptor, compressed: &[u8]) -> Result<Vec<u8>> {
    let expected = entry.uncompressed_size;
    let mut out = Vec::with_capacity(expected as usize);

    DeflateDecoder::new(compressed)
        .take(expected + 1)
        .read_to_end(&mut out)
        .map_err(|e| RemoteZipError::Decompress {
            path: entry.path.clone(),
            message: e.to_string(),
        })?;

    if out.len() as u64 != expected {
        return Err(RemoteZipError::Decompress {
            path: entry.path.clone(),
            message: format!(
                "inflated to {}{} bytes, expected {}",
                if out.len() as u64 > expected { "more than " } else { "" },
                out.len().min(expected as usize),
                expected
            ),
        });
    }

    Ok(out)
}

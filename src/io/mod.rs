mod http;
mod local;

pub use http::HttpRangeReader;
pub use local::LocalFileReader;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::{RemoteZipError, Result};

/// Identity of one remote archive: its resolved (post-redirect) location and
/// total length in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveHandle {
    pub url: String,
    pub size: u64,
}

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Resolved location of the data source
    fn source(&self) -> &str;

    /// Read exactly `len` bytes at `offset`, failing on a short read.
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let end = offset.checked_add(len as u64);
        if end.is_none_or(|end| end > self.size()) {
            return Err(RemoteZipError::transport(
                self.source(),
                None,
                format!(
                    "range {}+{} is outside the {} byte archive",
                    offset,
                    len,
                    self.size()
                ),
            ));
        }

        let mut buf = vec![0u8; len];
        let n = self.read_at(offset, &mut buf).await?;
        if n != len {
            return Err(RemoteZipError::transport(
                self.source(),
                None,
                format!("short read at offset {}: {} of {} bytes", offset, n, len),
            ));
        }
        Ok(buf)
    }

    fn handle(&self) -> ArchiveHandle {
        ArchiveHandle {
            url: self.source().to_string(),
            size: self.size(),
        }
    }
}

/// Opens a reader for an archive location.
///
/// `known` carries a handle from a cached index so the opener may skip the
/// existence check it would otherwise perform.
#[async_trait]
pub trait ArchiveOpener: Send + Sync {
    async fn open(&self, location: &str, known: Option<&ArchiveHandle>) -> Result<Arc<dyn ReadAt>>;
}

/// Opens `http://` and `https://` locations with [`HttpRangeReader`] and
/// everything else as a local file.
pub struct DefaultOpener {
    client: Client,
    max_retry: u32,
}

impl DefaultOpener {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| RemoteZipError::transport("", None, e.to_string()))?;
        Ok(Self {
            client,
            max_retry: config.max_retry,
        })
    }
}

pub fn is_http_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

#[async_trait]
impl ArchiveOpener for DefaultOpener {
    async fn open(&self, location: &str, known: Option<&ArchiveHandle>) -> Result<Arc<dyn ReadAt>> {
        if is_http_url(location) {
            let reader = match known {
                Some(handle) => HttpRangeReader::from_handle(self.client.clone(), handle.clone()),
                None => HttpRangeReader::with_client(self.client.clone(), location).await?,
            };
            Ok(Arc::new(reader.max_retry(self.max_retry)))
        } else {
            Ok(Arc::new(LocalFileReader::new(Path::new(location))?))
        }
    }
}

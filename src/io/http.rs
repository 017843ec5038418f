use async_trait::async_trait;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use super::{ArchiveHandle, ReadAt};
use crate::config::{DEFAULT_HTTP_TIMEOUT, DEFAULT_MAX_RETRY};
use crate::error::{RemoteZipError, Result};

/// HTTP Range reader for remote ZIP files
pub struct HttpRangeReader {
    client: Client,
    url: String,
    size: u64,
    max_retry: u32,
}

impl HttpRangeReader {
    /// Create a new HTTP Range reader
    ///
    /// This will send a HEAD request to resolve redirects and get file size
    pub async fn new(url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| RemoteZipError::transport(url, None, e.to_string()))?;
        Self::with_client(client, url).await
    }

    /// Create a reader sharing an existing client.
    pub async fn with_client(client: Client, url: &str) -> Result<Self> {
        let resp = client
            .head(url)
            .send()
            .await
            .map_err(|e| RemoteZipError::transport(url, e.status().map(|s| s.as_u16()), e.to_string()))?;

        let status = resp.status();
        let handle = if status.is_success() {
            let resolved = resp.url().to_string();

            // An explicit refusal is final; a missing header is settled by the first range read
            let accept_ranges = resp
                .headers()
                .get(ACCEPT_RANGES)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            if accept_ranges.eq_ignore_ascii_case("none") {
                return Err(RemoteZipError::transport(
                    &resolved,
                    Some(status.as_u16()),
                    "Remote server does not support Range requests",
                ));
            }

            let size = resp
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());

            match size {
                Some(size) => ArchiveHandle {
                    url: resolved,
                    size,
                },
                None => {
                    // Chunked HEAD answers carry no length
                    debug!(url = %resolved, "HEAD without Content-Length, probing with a one-byte range");
                    probe_with_range(&client, &resolved).await?
                }
            }
        } else if matches!(status, StatusCode::FORBIDDEN | StatusCode::METHOD_NOT_ALLOWED) {
            // Pre-signed object URLs are often valid for GET only
            debug!(url, %status, "HEAD rejected, probing with a one-byte range");
            probe_with_range(&client, url).await?
        } else {
            return Err(RemoteZipError::transport(
                url,
                Some(status.as_u16()),
                format!("HTTP request failed with status: {}", status),
            ));
        };

        debug!(url = %handle.url, size = handle.size, "opened remote archive");
        Ok(Self::from_handle(client, handle))
    }

    /// Create a reader for an archive whose location and size are already known.
    pub fn from_handle(client: Client, handle: ArchiveHandle) -> Self {
        Self {
            client,
            url: handle.url,
            size: handle.size,
            max_retry: DEFAULT_MAX_RETRY,
        }
    }

    pub fn max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry.max(1);
        self
    }
}

/// Learn the archive size from the `Content-Range` of a `bytes=0-0` request.
async fn probe_with_range(client: &Client, url: &str) -> Result<ArchiveHandle> {
    let resp = client
        .get(url)
        .header(RANGE, "bytes=0-0")
        .send()
        .await
        .map_err(|e| RemoteZipError::transport(url, None, e.to_string()))?;
    let resolved = resp.url().to_string();
    let range = check_partial(&resp, &resolved)?;

    let size = range.total.ok_or_else(|| {
        RemoteZipError::transport(
            &resolved,
            Some(resp.status().as_u16()),
            "Content-Range does not state the total length",
        )
    })?;

    Ok(ArchiveHandle {
        url: resolved,
        size,
    })
}

/// Parsed `Content-Range: bytes start-end/total` header.
#[derive(Debug, PartialEq, Eq)]
struct ContentRange {
    start: u64,
    end: u64,
    total: Option<u64>,
}

fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = rest.split_once('/')?;
    let (start, end) = range.trim().split_once('-')?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    Some(ContentRange {
        start: start.parse().ok()?,
        end: end.parse().ok()?,
        total,
    })
}

/// A ranged request must come back as 206 with a parseable `Content-Range`.
fn check_partial(resp: &Response, url: &str) -> Result<ContentRange> {
    let status = resp.status();
    if status == StatusCode::OK {
        return Err(RemoteZipError::transport(
            url,
            Some(status.as_u16()),
            "server ignored the Range header (status 200); range requests are unsupported",
        ));
    }
    if status != StatusCode::PARTIAL_CONTENT {
        return Err(RemoteZipError::transport(
            url,
            Some(status.as_u16()),
            format!("HTTP request failed with status: {}", status),
        ));
    }

    resp.headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range)
        .ok_or_else(|| {
            RemoteZipError::transport(
                url,
                Some(status.as_u16()),
                "206 response without a valid Content-Range header",
            )
        })
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }

        let end = offset + buf.len() as u64 - 1;
        let end = end.min(self.size - 1);
        let expected_size = (end - offset + 1) as usize;

        let mut received = 0;
        let mut retry_count = 0;

        while received < expected_size {
            let current_start = offset + received as u64;
            let range = format!("bytes={}-{}", current_start, end);

            let result = self.client.get(&self.url).header(RANGE, &range).send().await;

            match result {
                Ok(resp) => {
                    let content_range = check_partial(&resp, &self.url)?;
                    if content_range.start != current_start {
                        return Err(RemoteZipError::transport(
                            &self.url,
                            Some(resp.status().as_u16()),
                            format!(
                                "requested {} but server answered bytes {}-{}",
                                range, content_range.start, content_range.end
                            ),
                        ));
                    }

                    let bytes = resp.bytes().await.map_err(|e| {
                        RemoteZipError::transport(&self.url, None, e.to_string())
                    })?;
                    if bytes.is_empty() {
                        return Err(RemoteZipError::transport(
                            &self.url,
                            None,
                            format!("empty body for {}", range),
                        ));
                    }
                    let chunk_len = bytes.len().min(expected_size - received);
                    buf[received..received + chunk_len].copy_from_slice(&bytes[..chunk_len]);
                    received += chunk_len;
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    retry_count += 1;
                    if retry_count >= self.max_retry {
                        return Err(RemoteZipError::transport(
                            &self.url,
                            None,
                            format!("max retries exceeded for {}: {}", range, e),
                        ));
                    }
                    warn!(
                        url = %self.url,
                        %range,
                        "connection error, retry {}/{}: {}",
                        retry_count,
                        self.max_retry,
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(500 * retry_count as u64)).await;
                }
                Err(e) => {
                    return Err(RemoteZipError::transport(
                        &self.url,
                        e.status().map(|s| s.as_u16()),
                        e.to_string(),
                    ));
                }
            }
        }

        Ok(received)
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn source(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_forms() {
        assert_eq!(
            parse_content_range("bytes 0-0/1234"),
            Some(ContentRange {
                start: 0,
                end: 0,
                total: Some(1234)
            })
        );
        assert_eq!(
            parse_content_range("bytes 100-199/*"),
            Some(ContentRange {
                start: 100,
                end: 199,
                total: None
            })
        );
        assert_eq!(parse_content_range("items 0-1/2"), None);
        assert_eq!(parse_content_range("bytes */1234"), None);
    }
}

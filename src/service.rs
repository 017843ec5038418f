//! Request-level operations: index building, single and batched entry fetches.

use futures_util::StreamExt;
use futures_util::stream;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{RemoteZipError, Result};
use crate::index::{ArchiveIndex, IndexCache, IndexSummary, TtlIndexCache};
use crate::io::{ArchiveOpener, DefaultOpener, ReadAt};
use crate::payload::{Payload, ResponseType};
use crate::zip::{EntryDescriptor, ZipExtractor, ZipParser};

/// Timing and transfer figures for one entry fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchStats {
    pub bytes_fetched: u64,
    pub elapsed_ms: u64,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

/// Result of `fetch-entry`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedEntry {
    pub path: String,
    pub payload: Payload,
    pub stats: FetchStats,
}

/// Per-path failure in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryError {
    pub reason: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub similar_paths: Vec<String>,
}

impl From<&RemoteZipError> for EntryError {
    fn from(err: &RemoteZipError) -> Self {
        Self {
            reason: err.reason_code(),
            message: err.to_string(),
            similar_paths: err.similar_paths().to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub bytes_fetched: u64,
    pub elapsed_ms: u64,
}

/// Result of `fetch-entries-batch`. Partial failure never fails the call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub results: BTreeMap<String, Payload>,
    pub errors: BTreeMap<String, EntryError>,
    pub stats: BatchStats,
}

/// Entry point for random access to remote archives.
pub struct RemoteZip {
    config: EngineConfig,
    opener: Arc<dyn ArchiveOpener>,
    cache: Arc<dyn IndexCache>,
}

impl RemoteZip {
    /// Engine with the default HTTP/local opener and a process-local TTL cache.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let opener = Arc::new(DefaultOpener::new(&config)?);
        let cache = Arc::new(TtlIndexCache::new(config.index_ttl));
        Ok(Self::with_parts(config, opener, cache))
    }

    pub fn with_parts(
        config: EngineConfig,
        opener: Arc<dyn ArchiveOpener>,
        cache: Arc<dyn IndexCache>,
    ) -> Self {
        Self {
            config,
            opener,
            cache,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open the archive and return its index, building it on a cache miss.
    pub async fn open(&self, url: &str) -> Result<(Arc<ArchiveIndex>, Arc<dyn ReadAt>)> {
        if let Some(index) = self.cache.get(url).await {
            debug!(url, "index cache hit");
            let reader = self.opener.open(url, Some(index.handle())).await?;
            return Ok((index, reader));
        }

        debug!(url, "index cache miss");
        let reader = self.opener.open(url, None).await?;
        let index = Arc::new(self.build(&reader).await?);
        self.cache.put(url, Arc::clone(&index)).await;
        Ok((index, reader))
    }

    async fn build(&self, reader: &Arc<dyn ReadAt>) -> Result<ArchiveIndex> {
        ZipParser::new(Arc::clone(reader))
            .build_index(self.config.tail_size)
            .await
    }

    /// Look up or build the index for `url`.
    pub async fn index(&self, url: &str) -> Result<Arc<ArchiveIndex>> {
        Ok(self.open(url).await?.0)
    }

    /// Build the index for `url` from scratch and cache it.
    pub async fn build_index(&self, url: &str) -> Result<IndexSummary> {
        let reader = self.opener.open(url, None).await?;
        let index = Arc::new(self.build(&reader).await?);
        self.cache.put(url, Arc::clone(&index)).await;
        Ok(index.summary())
    }

    pub fn extractor(&self, reader: Arc<dyn ReadAt>) -> ZipExtractor<dyn ReadAt> {
        ZipExtractor::new(reader).max_entry_size(self.config.max_entry_size)
    }

    /// Resolve `path` in the index, with suggestions when it is missing.
    pub fn resolve<'a>(index: &'a ArchiveIndex, path: &str) -> Result<&'a EntryDescriptor> {
        index
            .get(path)
            .ok_or_else(|| RemoteZipError::EntryNotFound {
                path: path.to_string(),
                similar_paths: index.similar_paths(path),
            })
    }

    /// Fetch and decode a single entry.
    pub async fn fetch_entry(&self, url: &str, path: &str, shape: ResponseType) -> Result<FetchedEntry> {
        let started = Instant::now();
        let (index, reader) = self.open(url).await?;
        let entry = Self::resolve(&index, path)?;
        let extractor = self.extractor(reader);
        fetch_one(&extractor, entry, shape, started).await
    }

    /// Fetch up to `batch_limit` entries with one index lookup.
    ///
    /// Paths must be distinct; `stats.requested` is the number of paths
    /// given and always equals `results.len() + errors.len()`.
    pub async fn fetch_entries_batch(
        &self,
        url: &str,
        paths: &[String],
        shape: ResponseType,
    ) -> Result<BatchResult> {
        let started = Instant::now();

        if paths.len() > self.config.batch_limit {
            return Err(RemoteZipError::InvalidRequest(format!(
                "{} paths requested, at most {} allowed per batch",
                paths.len(),
                self.config.batch_limit
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = paths.iter().map(String::as_str).find(|p| !seen.insert(*p)) {
            return Err(RemoteZipError::InvalidRequest(format!(
                "path {} appears more than once in the batch",
                dup
            )));
        }

        let (index, reader) = self.open(url).await?;
        let extractor = self.extractor(reader);
        let concurrency = self.config.batch_concurrency.max(1);

        let outcomes: Vec<(&str, Result<FetchedEntry>)> = stream::iter(paths.iter().map(String::as_str))
            .map(|path| {
                let index = &index;
                let extractor = &extractor;
                async move {
                    let outcome = match Self::resolve(index, path) {
                        Ok(entry) => fetch_one(extractor, entry, shape, Instant::now()).await,
                        Err(e) => Err(e),
                    };
                    (path, outcome)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut results = BTreeMap::new();
        let mut errors = BTreeMap::new();
        let mut bytes_fetched = 0;
        for (path, outcome) in outcomes {
            match outcome {
                Ok(fetched) => {
                    bytes_fetched += fetched.stats.bytes_fetched;
                    results.insert(path.to_string(), fetched.payload);
                }
                Err(e) => {
                    debug!(path, error = %e, "batch entry failed");
                    errors.insert(path.to_string(), EntryError::from(&e));
                }
            }
        }

        let stats = BatchStats {
            requested: paths.len(),
            succeeded: results.len(),
            failed: errors.len(),
            bytes_fetched,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            url,
            requested = stats.requested,
            failed = stats.failed,
            bytes_fetched,
            "batch fetch finished"
        );

        Ok(BatchResult {
            results,
            errors,
            stats,
        })
    }
}

async fn fetch_one(
    extractor: &ZipExtractor<dyn ReadAt>,
    entry: &EntryDescriptor,
    shape: ResponseType,
    started: Instant,
) -> Result<FetchedEntry> {
    let (payload, bytes_fetched) = extractor.extract(entry, shape).await?;
    Ok(FetchedEntry {
        path: entry.path.clone(),
        payload,
        stats: FetchStats {
            bytes_fetched,
            elapsed_ms: started.elapsed().as_millis() as u64,
            compressed_size: entry.compressed_size,
            uncompressed_size: entry.uncompressed_size,
        },
    })
}

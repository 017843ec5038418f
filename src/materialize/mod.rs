//! Bulk extraction of a filtered entry set into a blob store.
//!
//! Candidates are processed in fixed-size groups: groups run one after
//! another, members of a group run concurrently. The time budget is checked
//! before each group starts; in-flight range requests are never cancelled.

mod filter;
mod manifest;
mod storage;

pub use filter::{EntryFilter, TEXT_EXTENSIONS};
pub use manifest::{ManifestEntry, ManifestIssue, ManifestStatus, MaterializationManifest, Totals};
pub use storage::{BlobStore, LocalDirStore, MemoryStore, StoredObject, entry_key, manifest_key};

use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{RemoteZipError, Result};
use crate::io::ReadAt;
use crate::payload::mime_type_for;
use crate::service::RemoteZip;
use crate::zip::{EntryDescriptor, ZipExtractor};

/// Reason recorded for entries left unattempted when the time budget ran out.
pub const BUDGET_EXHAUSTED: &str = "budget_exhausted";

/// Result of `materialize`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializeOutcome {
    pub manifest_url: String,
    pub status: ManifestStatus,
    pub totals: Totals,
    pub truncated: bool,
}

/// Drives a materialization run against one engine and one blob store.
pub struct Materializer {
    engine: Arc<RemoteZip>,
    store: Arc<dyn BlobStore>,
}

impl Materializer {
    pub fn new(engine: Arc<RemoteZip>, store: Arc<dyn BlobStore>) -> Self {
        Self { engine, store }
    }

    /// Extract every entry of `url` selected by `filter` and persist it under
    /// `archives/{archive_id}/entries/`, then upload the manifest.
    ///
    /// Per-entry failures are recorded in the manifest. An index build failure
    /// persists a `failed` manifest and is returned as the error.
    pub async fn materialize(
        &self,
        archive_id: &str,
        url: &str,
        filter: &EntryFilter,
    ) -> Result<MaterializeOutcome> {
        validate_archive_id(archive_id)?;
        let started = Instant::now();
        let mut manifest = MaterializationManifest::new(archive_id, url);

        let (index, reader) = match self.engine.open(url).await {
            Ok(opened) => opened,
            Err(e) => {
                warn!(archive_id, url, error = %e, "index build failed, recording failed manifest");
                manifest.fail(e.to_string());
                if let Err(upload) = self.upload_manifest(&manifest).await {
                    warn!(archive_id, error = %upload, "failed manifest could not be stored");
                }
                return Err(e);
            }
        };

        let config = self.engine.config();
        let extractor = self.engine.extractor(reader);
        let candidates: Vec<&EntryDescriptor> =
            index.entries().iter().filter(|e| filter.matches(e)).collect();
        manifest.totals.scanned = index.len() as u64;
        manifest.totals.total_text_entries = candidates.len() as u64;

        let mut work = Vec::with_capacity(candidates.len());
        for entry in candidates {
            if entry.uncompressed_size > config.max_entry_size {
                manifest.record_skipped(
                    &entry.path,
                    "too_large",
                    format!(
                        "{} bytes exceeds the {} byte limit",
                        entry.uncompressed_size, config.max_entry_size
                    ),
                );
            } else {
                work.push(entry);
            }
        }

        let group_size = config.materialize_concurrency.max(1);
        let groups: Vec<&[&EntryDescriptor]> = work.chunks(group_size).collect();
        for (i, group) in groups.iter().enumerate() {
            if config
                .time_budget
                .is_some_and(|budget| started.elapsed() >= budget)
            {
                manifest.truncated = true;
                for entry in groups[i..].iter().flat_map(|g| g.iter()) {
                    manifest.record_skipped(
                        &entry.path,
                        BUDGET_EXHAUSTED,
                        "time budget exhausted before extraction started".to_string(),
                    );
                }
                warn!(archive_id, remaining_groups = groups.len() - i, "time budget exhausted");
                break;
            }

            let mut outcomes = join_all(
                group
                    .iter()
                    .map(|entry| self.materialize_entry(&extractor, archive_id, entry)),
            )
            .await;

            let all_failed = outcomes.iter().all(|o| o.is_err());
            let transient = outcomes
                .iter()
                .any(|o| o.as_ref().is_err_and(RemoteZipError::is_transient));
            if group.len() > 1 && all_failed && transient {
                warn!(archive_id, group = i, "whole group failed, retrying one at a time");
                outcomes.clear();
                for entry in group.iter() {
                    outcomes.push(self.materialize_entry(&extractor, archive_id, entry).await);
                }
            }

            for (entry, outcome) in group.iter().zip(outcomes) {
                match outcome {
                    Ok(record) => manifest.record_materialized(record),
                    Err(e) => {
                        debug!(path = %entry.path, error = %e, "entry not materialized");
                        manifest.record_error(&entry.path, e.reason_code(), e.to_string());
                    }
                }
            }
        }

        manifest.finish(ManifestStatus::Done);
        let manifest_url = self.upload_manifest(&manifest).await?;
        info!(
            archive_id,
            materialized = manifest.totals.materialized,
            skipped = manifest.totals.skipped,
            errored = manifest.totals.errored,
            truncated = manifest.truncated,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "materialization finished"
        );

        Ok(MaterializeOutcome {
            manifest_url,
            status: manifest.status,
            totals: manifest.totals,
            truncated: manifest.truncated,
        })
    }

    async fn materialize_entry(
        &self,
        extractor: &ZipExtractor<dyn ReadAt>,
        archive_id: &str,
        entry: &EntryDescriptor,
    ) -> Result<ManifestEntry> {
        let extracted = extractor.extract_bytes(entry).await?;
        let mime_type = mime_type_for(&entry.path);
        let size = extracted.data.len() as u64;
        let key = entry_key(archive_id, &entry.path);
        let storage_url = self.store.put(&key, extracted.data, mime_type).await?;

        Ok(ManifestEntry {
            entry_path: entry.path.clone(),
            storage_url,
            mime_type: mime_type.to_string(),
            size,
            materialized_at: Utc::now(),
        })
    }

    async fn upload_manifest(&self, manifest: &MaterializationManifest) -> Result<String> {
        let key = manifest_key(&manifest.archive_id);
        let body = serde_json::to_vec_pretty(manifest).map_err(|e| RemoteZipError::StorageUpload {
            key: key.clone(),
            message: e.to_string(),
        })?;
        self.store.put(&key, body, "application/json").await
    }
}

fn validate_archive_id(archive_id: &str) -> Result<()> {
    let valid = !archive_id.is_empty()
        && archive_id != "."
        && archive_id != ".."
        && !archive_id.contains(['/', '\\']);
    if valid {
        Ok(())
    } else {
        Err(RemoteZipError::InvalidRequest(format!(
            "invalid archive id {:?}",
            archive_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_ids() {
        assert!(validate_archive_id("ig-2024-01").is_ok());
        for bad in ["", "..", "a/b", "a\\b"] {
            assert!(validate_archive_id(bad).is_err(), "{}", bad);
        }
    }
}

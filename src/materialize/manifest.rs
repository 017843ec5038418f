use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestStatus {
    Running,
    Done,
    Failed,
}

/// Aggregate counts of a materialization run.
///
/// `materialized + skipped + errored == total_text_entries` once the run
/// has finished.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    /// Entries in the archive index
    pub scanned: u64,
    /// Entries selected by the filter
    pub total_text_entries: u64,
    pub materialized: u64,
    pub skipped: u64,
    pub errored: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub entry_path: String,
    #[serde(rename = "storageURL")]
    pub storage_url: String,
    pub mime_type: String,
    pub size: u64,
    pub materialized_at: DateTime<Utc>,
}

/// An entry that was skipped or failed, with its reason code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestIssue {
    pub entry_path: String,
    pub reason: String,
    pub message: String,
}

/// Durable record of one materialization run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializationManifest {
    pub archive_id: String,
    pub archive_url: String,
    pub status: ManifestStatus,
    pub totals: Totals,
    /// The time budget ran out before every entry was attempted
    pub truncated: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub entries: Vec<ManifestEntry>,
    pub skipped_entries: Vec<ManifestIssue>,
    pub errors: Vec<ManifestIssue>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub failure: Option<String>,
}

impl MaterializationManifest {
    pub fn new(archive_id: &str, archive_url: &str) -> Self {
        Self {
            archive_id: archive_id.to_string(),
            archive_url: archive_url.to_string(),
            status: ManifestStatus::Running,
            totals: Totals::default(),
            truncated: false,
            started_at: Utc::now(),
            finished_at: None,
            entries: Vec::new(),
            skipped_entries: Vec::new(),
            errors: Vec::new(),
            failure: None,
        }
    }

    pub fn record_materialized(&mut self, entry: ManifestEntry) {
        self.totals.materialized += 1;
        self.entries.push(entry);
    }

    pub fn record_skipped(&mut self, entry_path: &str, reason: &str, message: String) {
        self.totals.skipped += 1;
        self.skipped_entries.push(ManifestIssue {
            entry_path: entry_path.to_string(),
            reason: reason.to_string(),
            message,
        });
    }

    pub fn record_error(&mut self, entry_path: &str, reason: &str, message: String) {
        self.totals.errored += 1;
        self.errors.push(ManifestIssue {
            entry_path: entry_path.to_string(),
            reason: reason.to_string(),
            message,
        });
    }

    pub fn finish(&mut self, status: ManifestStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, failure: String) {
        self.failure = Some(failure);
        self.finish(ManifestStatus::Failed);
    }
}

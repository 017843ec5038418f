//! Per-archive entry index and its cache.

mod cache;

pub use cache::{IndexCache, NoopIndexCache, TtlIndexCache};

use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;

use crate::io::ArchiveHandle;
use crate::zip::{CentralDirectoryLocation, EntryDescriptor, basename};

/// Maximum number of suggestions attached to a not-found error.
const MAX_SIMILAR_PATHS: usize = 5;

/// Entry descriptors for one archive, looked up by path.
#[derive(Debug, Clone)]
pub struct ArchiveIndex {
    handle: ArchiveHandle,
    location: CentralDirectoryLocation,
    entries: Vec<EntryDescriptor>,
    by_path: HashMap<String, usize>,
    built_at: Instant,
}

/// Summary returned by `build-index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSummary {
    pub url: String,
    pub archive_size: u64,
    pub entry_count: usize,
    pub total_entries: u64,
    pub cd_offset: u64,
    pub cd_size: u64,
    pub zip64: bool,
    pub complete: bool,
}

impl ArchiveIndex {
    pub fn new(
        handle: ArchiveHandle,
        location: CentralDirectoryLocation,
        entries: Vec<EntryDescriptor>,
    ) -> Self {
        // On duplicate paths the later record wins, as unzip tools do
        let by_path = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.path.clone(), i))
            .collect();
        Self {
            handle,
            location,
            entries,
            by_path,
            built_at: Instant::now(),
        }
    }

    pub fn handle(&self) -> &ArchiveHandle {
        &self.handle
    }

    pub fn location(&self) -> &CentralDirectoryLocation {
        &self.location
    }

    /// Entries in central directory order.
    pub fn entries(&self) -> &[EntryDescriptor] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn built_at(&self) -> Instant {
        self.built_at
    }

    /// Entry count declared by the end of central directory.
    pub fn total_entries(&self) -> u64 {
        self.location.total_entries
    }

    /// Whether as many entries were parsed as the archive declares.
    pub fn is_complete(&self) -> bool {
        self.entries.len() as u64 == self.location.total_entries
    }

    pub fn get(&self, path: &str) -> Option<&EntryDescriptor> {
        self.by_path.get(path).map(|&i| &self.entries[i])
    }

    /// Paths resembling `path`: same basename ignoring case, a case-insensitive
    /// full match, or one path being a suffix of the other.
    pub fn similar_paths(&self, path: &str) -> Vec<String> {
        let wanted = path.trim_start_matches('/').to_lowercase();
        let wanted_base = basename(&wanted).to_string();
        if wanted.is_empty() {
            return Vec::new();
        }

        let mut out: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.is_directory && e.path != path)
            .filter(|e| {
                let candidate = e.path.to_lowercase();
                candidate == wanted
                    || basename(&candidate) == wanted_base
                    || candidate.ends_with(&wanted)
                    || wanted.ends_with(&candidate)
            })
            .map(|e| e.path.clone())
            .collect();
        out.sort_by_key(|p| (p.to_lowercase() != wanted, p.len()));
        out.dedup();
        out.truncate(MAX_SIMILAR_PATHS);
        out
    }

    pub fn summary(&self) -> IndexSummary {
        IndexSummary {
            url: self.handle.url.clone(),
            archive_size: self.handle.size,
            entry_count: self.entries.len(),
            total_entries: self.location.total_entries,
            cd_offset: self.location.cd_offset,
            cd_size: self.location.cd_size,
            zip64: self.location.zip64,
            complete: self.is_complete(),
        }
    }
}

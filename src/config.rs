//! Engine tunables.

use std::time::Duration;

/// Bytes fetched from the archive tail when looking for the EOCD.
pub const DEFAULT_TAIL_SIZE: u64 = 128 * 1024;

/// Smallest tail that still holds an EOCD and a ZIP64 locator.
pub const MIN_TAIL_SIZE: u64 = 64;

/// Wider tail used by diagnostic tooling.
pub const DIAGNOSTIC_TAIL_SIZE: u64 = 256 * 1024;

/// Largest entry that will be buffered in memory.
pub const DEFAULT_MAX_ENTRY_SIZE: u64 = 50 * 1024 * 1024;

pub const DEFAULT_MATERIALIZE_CONCURRENCY: usize = 2;

pub const DEFAULT_BATCH_LIMIT: usize = 50;

pub const DEFAULT_BATCH_CONCURRENCY: usize = 4;

pub const DEFAULT_INDEX_TTL: Duration = Duration::from_secs(30 * 60);

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_MAX_RETRY: u32 = 10;

/// Configuration shared by the index builder, the fetch endpoints and the
/// materialization coordinator.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub tail_size: u64,
    pub max_entry_size: u64,
    pub materialize_concurrency: usize,
    pub batch_limit: usize,
    pub batch_concurrency: usize,
    pub index_ttl: Duration,
    pub http_timeout: Duration,
    pub max_retry: u32,
    /// Wall-clock ceiling for a materialization run. Checked before each group.
    pub time_budget: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tail_size: DEFAULT_TAIL_SIZE,
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
            materialize_concurrency: DEFAULT_MATERIALIZE_CONCURRENCY,
            batch_limit: DEFAULT_BATCH_LIMIT,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            index_ttl: DEFAULT_INDEX_TTL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            max_retry: DEFAULT_MAX_RETRY,
            time_budget: None,
        }
    }
}

impl EngineConfig {
    /// Configuration for offline forensics: wider tail, no size ceiling tweaks.
    pub fn diagnostic() -> Self {
        Self {
            tail_size: DIAGNOSTIC_TAIL_SIZE,
            ..Self::default()
        }
    }
}

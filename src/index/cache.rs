use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use super::ArchiveIndex;
use crate::config::DEFAULT_INDEX_TTL;

/// Store for built archive indexes, keyed by the archive location a caller
/// asked for.
///
/// Implementations may be process-local, shared, or no-ops. Rebuilding an
/// index is idempotent, so a cache is free to forget entries at any time.
#[async_trait]
pub trait IndexCache: Send + Sync {
    async fn get(&self, url: &str) -> Option<Arc<ArchiveIndex>>;

    async fn put(&self, url: &str, index: Arc<ArchiveIndex>);
}

/// Process-local cache whose entries expire a fixed time after they were built.
pub struct TtlIndexCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Arc<ArchiveIndex>>>,
}

impl TtlIndexCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of cached archives, expired ones included until next touched.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<ArchiveIndex>>> {
        // A panic while holding the lock cannot leave a half-written index behind
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for TtlIndexCache {
    fn default() -> Self {
        Self::new(DEFAULT_INDEX_TTL)
    }
}

#[async_trait]
impl IndexCache for TtlIndexCache {
    async fn get(&self, url: &str) -> Option<Arc<ArchiveIndex>> {
        let mut entries = self.lock();
        let index = entries.get(url)?;
        if index.built_at().elapsed() >= self.ttl {
            debug!(url, "cached index expired");
            entries.remove(url);
            return None;
        }
        Some(Arc::clone(index))
    }

    async fn put(&self, url: &str, index: Arc<ArchiveIndex>) {
        let mut entries = self.lock();
        // Drop anything stale while we hold the lock
        let ttl = self.ttl;
        entries.retain(|_, idx| idx.built_at().elapsed() < ttl);
        entries.insert(url.to_string(), index);
    }
}

/// Cache that never remembers anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIndexCache;

#[async_trait]
impl IndexCache for NoopIndexCache {
    async fn get(&self, _url: &str) -> Option<Arc<ArchiveIndex>> {
        None
    }

    async fn put(&self, _url: &str, _index: Arc<ArchiveIndex>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::index;

    #[tokio::test]
    async fn returns_fresh_entries() {
        let cache = TtlIndexCache::default();
        assert!(cache.get("u").await.is_none());

        cache.put("u", Arc::new(index(&["a.txt"]))).await;
        let hit = cache.get("u").await.unwrap();
        assert!(hit.get("a.txt").is_some());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn expires_after_ttl() {
        let cache = TtlIndexCache::new(Duration::from_millis(20));
        cache.put("u", Arc::new(index(&["a.txt"]))).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get("u").await.is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn noop_never_hits() {
        let cache = NoopIndexCache;
        cache.put("u", Arc::new(index(&["a.txt"]))).await;
        assert!(cache.get("u").await.is_none());
    }
}

//! Object storage sinks for materialized entries and manifests.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{RemoteZipError, Result};

/// Put/get blob API used to persist extracted entries and manifests.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key` and return a URL a viewer can fetch it from.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<String>;

    /// Fetch a previously stored object.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// Key for an extracted entry of an archive.
pub fn entry_key(archive_id: &str, entry_path: &str) -> String {
    format!("archives/{}/entries/{}", archive_id, entry_path.trim_start_matches('/'))
}

/// Key for the manifest of an archive.
pub fn manifest_key(archive_id: &str) -> String {
    format!("archives/{}/manifest.json", archive_id)
}

/// Blob store writing objects below a local directory.
///
/// Keys map to relative paths. Keys that would escape the root (`..`,
/// absolute paths, drive prefixes) are refused.
pub struct LocalDirStore {
    root: PathBuf,
    base_url: Option<String>,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            base_url: None,
        }
    }

    /// Report stored objects as `{base_url}/{key}` instead of local paths.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe {
            return Err(RemoteZipError::StorageUpload {
                key: key.to_string(),
                message: "key escapes the storage root".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }

    fn url_for(&self, key: &str, path: &Path) -> String {
        match &self.base_url {
            Some(base) => format!("{}/{}", base, key),
            None => path.display().to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for LocalDirStore {
    async fn put(&self, key: &str, data: Vec<u8>, _content_type: &str) -> Result<String> {
        let path = self.path_for(key)?;
        let upload_err = |e: std::io::Error| RemoteZipError::StorageUpload {
            key: key.to_string(),
            message: e.to_string(),
        };

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(upload_err)?;
        }

        let mut file = fs::File::create(&path).await.map_err(upload_err)?;
        file.write_all(&data).await.map_err(upload_err)?;
        file.flush().await.map_err(upload_err)?;

        Ok(self.url_for(key, &path))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// A stored object with its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// In-process blob store.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.lock().get(key).cloned()
    }

    /// Stored keys in lexical order.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<String> {
        self.lock().insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(format!("memory://{}", key))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock().get(key).map(|o| o.data.clone()))
    }
}

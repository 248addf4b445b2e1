//! The abstract durable storage capability the engine depends on.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::StorageResult;

/// Durable storage sink: persist generated media and fetch it back for
/// local processing. Implementations are interchangeable (object store,
/// local filesystem, test double).
#[async_trait]
pub trait StorageSink: Send + Sync {
    /// Persist `data` under a logical folder, returning a public URL.
    async fn put(&self, data: Vec<u8>, folder: &str, content_type: &str)
        -> StorageResult<String>;

    /// Fetch a URL (ours or a provider's transient one) to a local file.
    async fn fetch(&self, url: &str, dest: &Path) -> StorageResult<PathBuf>;
}

/// Filesystem-backed sink. Used in tests and local development; "public"
/// URLs are `file://` paths under the root directory.
#[derive(Debug, Clone)]
pub struct LocalSink {
    root: PathBuf,
}

impl LocalSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl StorageSink for LocalSink {
    async fn put(
        &self,
        data: Vec<u8>,
        folder: &str,
        content_type: &str,
    ) -> StorageResult<String> {
        let ext = extension_for(content_type);
        let dir = self.root.join(folder);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}.{}", uuid::Uuid::new_v4(), ext));
        tokio::fs::write(&path, data).await?;
        Ok(format!("file://{}", path.display()))
    }

    async fn fetch(&self, url: &str, dest: &Path) -> StorageResult<PathBuf> {
        let source = url
            .strip_prefix("file://")
            .ok_or_else(|| crate::error::StorageError::InvalidUrl(url.to_string()))?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(source, dest).await?;
        Ok(dest.to_path_buf())
    }
}

/// Map a content type onto a file extension for generated object keys.
pub(crate) fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "video/mp4" => "mp4",
        "audio/mpeg" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        _ => "bin",
    }
}

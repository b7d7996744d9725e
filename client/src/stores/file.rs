//! File-backed key/value store.
//!
//! One file per key under a root directory. Writes go to a temporary sibling
//! and are renamed into place, so a crash mid-write leaves either the old
//! value or the new one, never a torn file.

use crate::error::CacheError;
use crate::providers::KeyValueStore;
use futures::future::BoxFuture;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// [`KeyValueStore`] persisted as JSON files.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    root: PathBuf,
}

impl FileKeyValueStore {
    /// Store files under `root`; the directory is created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding `key`.
    ///
    /// Keys are namespaced with `/`; the key is percent-encoded so it can
    /// never escape the root.
    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", urlencoding::encode(key)))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<String>, CacheError>> {
        let path = self.path_for(key);
        Box::pin(async move {
            match tokio::fs::read_to_string(&path).await {
                Ok(value) => Ok(Some(value)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn set(&self, key: &str, value: String) -> BoxFuture<'_, Result<(), CacheError>> {
        let path = self.path_for(key);
        Box::pin(async move {
            tokio::fs::create_dir_all(&self.root).await?;

            let temp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
            tokio::fs::write(&temp, value).await?;
            if let Err(e) = tokio::fs::rename(&temp, &path).await {
                let _ = tokio::fs::remove_file(&temp).await;
                return Err(e.into());
            }

            tracing::trace!(path = %path.display(), "Cache entry written");
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> BoxFuture<'_, Result<(), CacheError>> {
        let path = self.path_for(key);
        Box::pin(async move {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }
}

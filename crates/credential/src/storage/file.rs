//! Filesystem storage backend: one file per key under a root directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::Storage;
use crate::core::StorageError;

/// [`Storage`] that keeps each key in its own file.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, std::io::Error> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("key '{key}' is not a plain file name"),
            ));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let read_failure = |source| StorageError::ReadFailure {
            key: key.to_string(),
            source,
        };
        let path = self.path_for(key).map_err(read_failure)?;

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(read_failure(e)),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        let write_failure = |source| StorageError::WriteFailure {
            key: key.to_string(),
            source,
        };
        let path = self.path_for(key).map_err(write_failure)?;
        let tmp = self
            .root
            .join(format!(".{key}.{}.tmp", uuid::Uuid::new_v4().simple()));

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(write_failure)?;
        tokio::fs::write(&tmp, &value).await.map_err(write_failure)?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(write_failure(e));
        }

        tracing::debug!(key, path = %path.display(), bytes = value.len(), "Stored record");
        Ok(())
    }
}

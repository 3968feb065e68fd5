//! Directory-backed blob store: one directory per namespace, one file per key

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{validate_key, BlobStore};
use crate::error::StorageError;

const BLOB_EXTENSION: &str = "blob";

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, namespace: &str) -> Result<PathBuf, StorageError> {
        validate_key(namespace)?;
        Ok(self.root.join(namespace))
    }

    fn blob_path(&self, namespace: &str, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self
            .namespace_dir(namespace)?
            .join(format!("{}.{}", key, BLOB_EXTENSION)))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.blob_path(namespace, key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        let path = self.blob_path(namespace, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write then rename, so a crash never leaves a half-written blob
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &value).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!("Stored {}/{} ({} bytes)", namespace, key, value.len());
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let path = self.blob_path(namespace, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self, namespace: &str) -> Result<(), StorageError> {
        let dir = self.namespace_dir(namespace)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::debug!("Cleared namespace {}", namespace);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

//! Persistent key-value blob storage
//!
//! Values are opaque byte blobs grouped in namespaces. The editor uses the
//! `asset` namespace (key `current`) and the `history` namespace (keys
//! `slot-0` upward).

mod fs;
mod session_store;

pub use fs::FsBlobStore;
pub use session_store::{RestoredSession, SessionStore, ASSET_NAMESPACE, CURRENT_KEY, HISTORY_NAMESPACE};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::StorageError;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    async fn put(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    /// Missing keys are not an error
    async fn delete(&self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Remove every key in a namespace
    async fn clear(&self, namespace: &str) -> Result<(), StorageError>;
}

/// Keys are flat identifiers: ASCII letters, digits, `-` and `_`
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// Volatile in-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, HashMap<String, Vec<u8>>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys in a namespace
    pub async fn len(&self, namespace: &str) -> usize {
        self.blobs
            .read()
            .await
            .get(namespace)
            .map(|ns| ns.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_key(namespace)?;
        validate_key(key)?;
        Ok(self
            .blobs
            .read()
            .await
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .cloned())
    }

    async fn put(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        validate_key(namespace)?;
        validate_key(key)?;
        self.blobs
            .write()
            .await
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        validate_key(namespace)?;
        validate_key(key)?;
        if let Some(ns) = self.blobs.write().await.get_mut(namespace) {
            ns.remove(key);
        }
        Ok(())
    }

    async fn clear(&self, namespace: &str) -> Result<(), StorageError> {
        validate_key(namespace)?;
        self.blobs.write().await.remove(namespace);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_contract() {
        let store = MemoryBlobStore::new();
        assert_eq!(store.get("asset", "current").await.unwrap(), None);

        store.put("asset", "current", vec![1, 2, 3]).await.unwrap();
        store.put("history", "slot-0", vec![4]).await.unwrap();
        store.put("history", "slot-1", vec![5]).await.unwrap();
        assert_eq!(
            store.get("asset", "current").await.unwrap(),
            Some(vec![1, 2, 3])
        );

        store.clear("history").await.unwrap();
        assert_eq!(store.len("history").await, 0);
        assert_eq!(store.len("asset").await, 1);

        store.delete("asset", "current").await.unwrap();
        store.delete("asset", "current").await.unwrap();
        assert_eq!(store.get("asset", "current").await.unwrap(), None);
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("slot-4").is_ok());
        assert!(validate_key("../current").is_err());
        assert!(validate_key("").is_err());
    }
}

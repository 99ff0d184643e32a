//! In-process object store for tests and dry runs.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{StorageError, StorageResult, TransferOp};
use crate::keys::{Locator, MEMORY_SCHEME};
use crate::store::ObjectStore;

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.keys()
            .await
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect()
    }

    fn key_of(locator: &str) -> StorageResult<String> {
        match Locator::parse(locator)? {
            Locator::R2 { .. } => Err(StorageError::invalid_locator(locator)),
            other => Ok(other.key().to_string()),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, bytes: Vec<u8>, key: &str, _content_type: &str) -> StorageResult<String> {
        if key.is_empty() {
            return Err(StorageError::transfer(TransferOp::Put, key, "empty key"));
        }
        debug!("Storing {} bytes at {}", bytes.len(), key);
        self.objects.write().await.insert(key.to_string(), bytes);
        Ok(format!("{}{}", MEMORY_SCHEME, key))
    }

    async fn get(&self, locator: &str) -> StorageResult<Vec<u8>> {
        let key = Self::key_of(locator)?;
        self.objects
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(key))
    }

    async fn delete(&self, locator: &str) -> StorageResult<()> {
        let key = Self::key_of(locator)?;
        self.objects.write().await.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryObjectStore::new();
        let locator = store.put(b"abc".to_vec(), "music/v/g.wav", "audio/wav").await.unwrap();
        assert_eq!(locator, "mem://music/v/g.wav");
        assert_eq!(store.get(&locator).await.unwrap(), b"abc");
        assert_eq!(store.get("music/v/g.wav").await.unwrap(), b"abc");

        store.delete(&locator).await.unwrap();
        assert!(matches!(store.get(&locator).await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rejects_foreign_locators() {
        let store = MemoryObjectStore::new();
        assert!(matches!(
            store.get("r2://bucket/key").await,
            Err(StorageError::InvalidLocator(_))
        ));
    }

    #[tokio::test]
    async fn test_file_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.mp4");
        tokio::fs::write(&src, b"video").await.unwrap();

        let store = MemoryObjectStore::new();
        let locator = store.put_file(&src, "videos/v/in.mp4").await.unwrap();

        let dst = dir.path().join("nested/out.mp4");
        let written = store.get_to_file(&locator, Path::new(&dst)).await.unwrap();
        assert_eq!(written, 5);
        assert_eq!(tokio::fs::read(&dst).await.unwrap(), b"video");
        assert_eq!(store.keys_with_prefix("videos/").await, vec!["videos/v/in.mp4"]);
    }
}

//! The object storage capability used by the pipeline.

use async_trait::async_trait;
use std::path::Path;

use crate::error::StorageResult;
use crate::keys::content_type_for;

/// Put/get access to durable object storage.
///
/// `put` returns a locator string that `get` accepts.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, bytes: Vec<u8>, key: &str, content_type: &str) -> StorageResult<String>;

    async fn get(&self, locator: &str) -> StorageResult<Vec<u8>>;

    async fn delete(&self, locator: &str) -> StorageResult<()>;

    /// Upload a local file, inferring the content type from the key.
    async fn put_file(&self, path: &Path, key: &str) -> StorageResult<String> {
        let bytes = tokio::fs::read(path).await?;
        self.put(bytes, key, content_type_for(key)).await
    }

    /// Download an object into a local file, creating parent directories.
    async fn get_to_file(&self, locator: &str, path: &Path) -> StorageResult<u64> {
        let bytes = self.get(locator).await?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let len = bytes.len() as u64;
        tokio::fs::write(path, bytes).await?;
        Ok(len)
    }
}

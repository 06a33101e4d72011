// Blob storage layer (S3-compatible or in-memory)

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::StorageConfig;
use crate::types::{AppError, AppResult};

pub mod memory;
pub mod s3_client;

pub use memory::InMemoryBlobStore;
pub use s3_client::S3BlobStore;

pub type ObjectMetadata = HashMap<String, String>;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key` and return the object's URL
    async fn put(
        &self,
        data: Bytes,
        key: &str,
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> AppResult<String>;

    /// Fetch an object; `AppError::NotFound` when the key is absent
    async fn get(&self, key: &str) -> AppResult<Bytes>;

    async fn delete(&self, key: &str) -> AppResult<()>;

    async fn exists(&self, key: &str) -> AppResult<bool>;
}

/// Build the blob store selected by `STORAGE_PROVIDER`
pub fn from_config(config: &StorageConfig) -> AppResult<Arc<dyn BlobStore>> {
    match config.provider.to_lowercase().as_str() {
        "s3" => Ok(Arc::new(S3BlobStore::new(config)?)),
        "memory" => Ok(Arc::new(InMemoryBlobStore::new())),
        other => Err(AppError::InvalidRequest(format!("Unsupported storage provider: {}", other))),
    }
}

/// First 8 hex characters of a fresh UUID, used to keep object keys unique
pub fn unique_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

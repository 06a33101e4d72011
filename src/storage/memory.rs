// In-process blob store for local runs and tests

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::storage::{BlobStore, ObjectMetadata};
use crate::types::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
    pub metadata: ObjectMetadata,
}

#[derive(Clone, Default)]
pub struct InMemoryBlobStore {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(
        &self,
        data: Bytes,
        key: &str,
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> AppResult<String> {
        let object = StoredObject {
            data,
            content_type: content_type.to_string(),
            metadata: metadata.clone(),
        };
        self.objects.write().await.insert(key.to_string(), object);
        Ok(format!("memory://{}", key))
    }

    async fn get(&self, key: &str) -> AppResult<Bytes> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| AppError::NotFound(format!("Object not found: {}", key)))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(self.objects.read().await.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryBlobStore::new();
        let mut metadata = ObjectMetadata::new();
        metadata.insert("patient_id".to_string(), "7".to_string());

        let url = store
            .put(Bytes::from_static(b"hello"), "patients/7/1_abc.txt", "text/plain", &metadata)
            .await
            .unwrap();
        assert_eq!(url, "memory://patients/7/1_abc.txt");
        assert!(store.exists("patients/7/1_abc.txt").await.unwrap());

        let object = store.object("patients/7/1_abc.txt").await.unwrap();
        assert_eq!(object.content_type, "text/plain");
        assert_eq!(object.metadata.get("patient_id").map(String::as_str), Some("7"));
        assert_eq!(store.get("patients/7/1_abc.txt").await.unwrap(), Bytes::from_static(b"hello"));

        store.delete("patients/7/1_abc.txt").await.unwrap();
        assert!(!store.exists("patients/7/1_abc.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let store = InMemoryBlobStore::new();
        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        // deleting an absent key is not an error
        store.delete("nope").await.unwrap();
    }
}

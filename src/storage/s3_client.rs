// S3 blob store backed by rust-s3

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};
use bytes::Bytes;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::bucket::Bucket;
use s3::region::Region;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::storage::{BlobStore, ObjectMetadata};
use crate::types::{AppError, AppResult};

pub struct S3BlobStore {
    bucket: Box<Bucket>,
}

impl S3BlobStore {
    pub fn new(config: &StorageConfig) -> AppResult<Self> {
        if config.s3_bucket.is_empty() {
            return Err(AppError::InvalidRequest("S3_BUCKET must be set".to_string()));
        }

        let region = match &config.s3_endpoint {
            Some(endpoint) => Region::Custom {
                region: config.s3_region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .s3_region
                .parse()
                .map_err(|e| AppError::Storage(format!("Invalid S3 region {}: {}", config.s3_region, e)))?,
        };

        let credentials = Credentials::new(
            config.s3_access_key_id.as_deref(),
            config.s3_secret_access_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|e| AppError::Storage(format!("Invalid S3 credentials: {}", e)))?;

        let bucket = Bucket::new(&config.s3_bucket, region, credentials)
            .map_err(|e| AppError::Storage(format!("Failed to open bucket: {}", e)))?;
        // Custom endpoints (MinIO, LocalStack) expect path-style addressing
        let bucket = if config.s3_endpoint.is_some() {
            bucket.with_path_style()
        } else {
            bucket
        };

        info!(bucket = %config.s3_bucket, region = %config.s3_region, "S3 blob store ready");
        Ok(Self { bucket: Box::new(bucket) })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.bucket.url().trim_end_matches('/'), key)
    }
}

/// `x-amz-meta-*` headers for the object metadata, sorted by key. Entries that are not
/// valid header text are dropped.
fn metadata_headers(metadata: &ObjectMetadata) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = metadata
        .iter()
        .filter_map(|(key, value)| {
            let name = format!("x-amz-meta-{}", key.to_ascii_lowercase().replace('_', "-"));
            if HeaderName::from_bytes(name.as_bytes()).is_err() || HeaderValue::from_str(value).is_err() {
                warn!(key = %key, "Skipping object metadata that is not valid header text");
                return None;
            }
            Some((name, value.clone()))
        })
        .collect();
    headers.sort();
    headers
}

fn is_not_found(error: &S3Error) -> bool {
    matches!(error, S3Error::HttpFailWithBody(404, _))
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        data: Bytes,
        key: &str,
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> AppResult<String> {
        debug!(key, size = data.len(), ?metadata, "Uploading object to S3");
        let mut bucket = self.bucket.as_ref().clone();
        for (name, value) in metadata_headers(metadata) {
            bucket.add_header(&name, &value);
        }
        let response = bucket
            .put_object_with_content_type(key, &data, content_type)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to upload {}: {}", key, e)))?;

        if response.status_code() >= 300 {
            return Err(AppError::Storage(format!(
                "Failed to upload {}: status {}",
                key,
                response.status_code()
            )));
        }
        Ok(self.object_url(key))
    }

    async fn get(&self, key: &str) -> AppResult<Bytes> {
        match self.bucket.get_object(key).await {
            Ok(response) if response.status_code() == 404 => {
                Err(AppError::NotFound(format!("Object not found: {}", key)))
            }
            Ok(response) if response.status_code() >= 300 => Err(AppError::Storage(format!(
                "Failed to download {}: status {}",
                key,
                response.status_code()
            ))),
            Ok(response) => Ok(response.bytes().clone()),
            Err(e) if is_not_found(&e) => Err(AppError::NotFound(format!("Object not found: {}", key))),
            Err(e) => Err(AppError::Storage(format!("Failed to download {}: {}", key, e))),
        }
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.bucket
            .delete_object(key)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to delete {}: {}", key, e)))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        match self.bucket.head_object(key).await {
            Ok((_, 404)) => Ok(false),
            Ok((_, code)) if code < 300 => Ok(true),
            Ok((_, code)) => Err(AppError::Storage(format!(
                "Error checking {}: status {}",
                key, code
            ))),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(AppError::Storage(format!("Error checking {}: {}", key, e))),
        }
    }
}

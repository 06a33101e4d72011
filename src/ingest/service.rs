use std::sync::Arc;

use bytes::Bytes;
use tracing::{error, info, warn};

use crate::db::Repository;
use crate::extraction::TextProducer;
use crate::models::{FileRecord, NewFile, StageStatus};
use crate::queue::WorkerPools;
use crate::retrieval::DocumentIndex;
use crate::storage::{unique_suffix, BlobStore, ObjectMetadata};
use crate::types::{AppError, AppResult};

const OCTET_STREAM: &str = "application/octet-stream";

/// One uploaded file as received from the client
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Accepts uploads and moves each one through the transfer and extraction stages
/// in the background. The file record is the only thing the caller waits for.
#[derive(Clone)]
pub struct IngestService {
    inner: Arc<Inner>,
}

struct Inner {
    repository: Arc<dyn Repository>,
    store: Arc<dyn BlobStore>,
    producer: Arc<dyn TextProducer>,
    index: Arc<DocumentIndex>,
    pools: WorkerPools,
}

impl IngestService {
    pub fn new(
        repository: Arc<dyn Repository>,
        store: Arc<dyn BlobStore>,
        producer: Arc<dyn TextProducer>,
        index: Arc<DocumentIndex>,
        pools: WorkerPools,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                repository,
                store,
                producer,
                index,
                pools,
            }),
        }
    }

    /// Create the file record (both stages `pending`) and start processing in the background
    pub async fn upload(&self, owner_id: i64, upload: Upload) -> AppResult<FileRecord> {
        let filename = upload.filename.trim().to_string();
        if filename.is_empty() {
            return Err(AppError::InvalidRequest("filename must not be empty".to_string()));
        }
        if upload.data.is_empty() {
            return Err(AppError::InvalidRequest(format!("{} is empty", filename)));
        }

        let content_type = resolve_content_type(&filename, upload.content_type.as_deref());
        let record = self
            .inner
            .repository
            .create_file(NewFile {
                owner_id,
                filename,
                file_type: content_type,
                file_size: upload.data.len() as i64,
            })
            .await?;
        info!(
            file_id = record.id,
            owner_id,
            filename = %record.filename,
            size = record.file_size,
            "Accepted upload"
        );

        let service = self.clone();
        let file = record.clone();
        tokio::spawn(async move {
            service.process(file, upload.data).await;
        });

        Ok(record)
    }

    pub async fn list_files(&self, owner_id: i64) -> AppResult<Vec<FileRecord>> {
        self.inner.repository.list_owner_files(owner_id).await
    }

    /// Run both stages for one file and return the final extraction status
    pub async fn process(&self, file: FileRecord, data: Bytes) -> StageStatus {
        let (key, url) = match self.transfer(&file, data).await {
            Ok(location) => location,
            Err(e) => {
                error!(file_id = file.id, error = %e, "Transfer failed");
                self.set_stage(file.id, Stage::Transfer, StageStatus::Failed).await;
                // extraction can never start, settle it so waiting jobs see a terminal record
                self.set_stage(file.id, Stage::Extraction, StageStatus::Failed).await;
                return StageStatus::Failed;
            }
        };

        match self.extract(&file, &key, &url).await {
            Ok(fragments) => {
                info!(file_id = file.id, fragments, "Indexed file");
                self.set_stage(file.id, Stage::Extraction, StageStatus::Done).await;
                StageStatus::Done
            }
            Err(e) => {
                warn!(file_id = file.id, error = %e, "Extraction failed");
                self.set_stage(file.id, Stage::Extraction, StageStatus::Failed).await;
                StageStatus::Failed
            }
        }
    }

    async fn transfer(&self, file: &FileRecord, data: Bytes) -> AppResult<(String, String)> {
        self.inner
            .repository
            .update_transfer_status(file.id, StageStatus::InProgress)
            .await?;

        let key = storage_key(file);
        let mut metadata = ObjectMetadata::new();
        metadata.insert("owner_id".to_string(), file.owner_id.to_string());
        metadata.insert("file_id".to_string(), file.id.to_string());

        let store = self.inner.store.clone();
        let url = self
            .inner
            .pools
            .storage
            .run(store.put(data, &key, &file.file_type, &metadata))
            .await?;

        self.inner
            .repository
            .update_file_location(file.id, &key, &url)
            .await?;
        Ok((key, url))
    }

    async fn extract(&self, file: &FileRecord, key: &str, url: &str) -> AppResult<usize> {
        self.inner
            .repository
            .update_extraction_status(file.id, StageStatus::InProgress)
            .await?;

        let store = self.inner.store.clone();
        let bytes = self.inner.pools.extraction.run(store.get(key)).await?;

        let producer = self.inner.producer.clone();
        let mime = file.file_type.clone();
        let extraction = self
            .inner
            .pools
            .extraction
            .run_blocking(move || producer.extract(&bytes, &mime))
            .await?;

        Ok(self
            .inner
            .index
            .insert(extraction.chunks, file.owner_id, file.id, &file.filename, Some(url))
            .await)
    }

    async fn set_stage(&self, file_id: i64, stage: Stage, status: StageStatus) {
        let repository = &self.inner.repository;
        let result = match stage {
            Stage::Transfer => repository.update_transfer_status(file_id, status).await,
            Stage::Extraction => repository.update_extraction_status(file_id, status).await,
        };
        if let Err(e) = result {
            error!(file_id, ?stage, %status, error = %e, "Failed to record stage status");
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Transfer,
    Extraction,
}

/// Use the declared type unless it is missing or generic, then guess from the filename
fn resolve_content_type(filename: &str, declared: Option<&str>) -> String {
    match declared.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) if !t.eq_ignore_ascii_case(OCTET_STREAM) => t.to_lowercase(),
        _ => mime_guess::from_path(filename)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }
}

/// `patients/{owner}/{file_id}_{suffix}.{ext}`
fn storage_key(file: &FileRecord) -> String {
    let ext = file
        .filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string());
    format!("patients/{}/{}_{}.{}", file.owner_id, file.id, unique_suffix(), ext)
}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::config::Config;
use crate::db::Repository;
use crate::extraction;
use crate::ingest::IngestService;
use crate::llm::LLM;
use crate::pipeline::{PipelineController, SummaryGenerator};
use crate::queue::WorkerPools;
use crate::render::PdfRenderer;
use crate::retrieval::{DocumentIndex, RetrievalService};
use crate::storage;
use crate::types::{AppError, AppResult};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub repository: Arc<dyn Repository>,
    pub index: Arc<DocumentIndex>,
    pub retrieval: RetrievalService,
    pub summaries: SummaryGenerator,
    pub pipeline: PipelineController,
    pub ingest: IngestService,
}

impl AppState {
    /// Wire every service from configuration around the given repository
    pub fn build(config: Config, repository: Arc<dyn Repository>) -> AppResult<Self> {
        let index = Arc::new(DocumentIndex::new());
        let generator = LLM::from_config(&config.llm)?;
        let store = storage::from_config(&config.storage)?;
        let producer = extraction::from_config(&config.extraction)?;
        let pools = WorkerPools::new(&config.pipeline);

        let retrieval = RetrievalService::new(index.clone(), generator.clone());
        let summaries = SummaryGenerator::new(retrieval.clone(), generator, config.pipeline.quality_check);
        let pipeline = PipelineController::new(
            repository.clone(),
            summaries.clone(),
            Arc::new(PdfRenderer::new()),
            store.clone(),
            pools.clone(),
            config.pipeline.clone(),
        );
        let ingest = IngestService::new(repository.clone(), store, producer, index.clone(), pools);

        Ok(Self {
            config,
            repository,
            index,
            retrieval,
            summaries,
            pipeline,
            ingest,
        })
    }
}

/// Lifecycle of a summary job. Only `Processing` may change, and only to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Processing)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(self, JobStatus::Processing) && next.is_terminal()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(AppError::Internal(format!("Unknown job status: {}", other))),
        }
    }
}

/// Status of one stage (transfer or extraction) of an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::InProgress => "in_progress",
            StageStatus::Done => "done",
            StageStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Done | StageStatus::Failed)
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StageStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StageStatus::Pending),
            "in_progress" => Ok(StageStatus::InProgress),
            "done" => Ok(StageStatus::Done),
            "failed" => Ok(StageStatus::Failed),
            other => Err(AppError::Internal(format!("Unknown stage status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub owner_id: i64,
    pub prerequisite_ids: Vec<i64>,
    pub category: String,
    pub custom_prompt: Option<String>,
    pub status: JobStatus,
    pub artifact_location: Option<String>,
    pub artifact_url: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub owner_id: i64,
    pub prerequisite_ids: Vec<i64>,
    pub category: String,
    pub custom_prompt: Option<String>,
}

/// The two-stage status view of an uploaded file the pipeline waits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrerequisiteRecord {
    pub id: i64,
    pub owner_id: i64,
    pub transfer_status: StageStatus,
    pub extraction_status: StageStatus,
}

impl PrerequisiteRecord {
    pub fn is_settled(&self) -> bool {
        self.transfer_status.is_terminal() && self.extraction_status.is_terminal()
    }

    pub fn has_failed_stage(&self) -> bool {
        self.transfer_status == StageStatus::Failed || self.extraction_status == StageStatus::Failed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub owner_id: i64,
    pub filename: String,
    pub file_type: String,
    pub file_size: i64,
    pub storage_key: Option<String>,
    pub storage_url: Option<String>,
    pub transfer_status: StageStatus,
    pub extraction_status: StageStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn prerequisite(&self) -> PrerequisiteRecord {
        PrerequisiteRecord {
            id: self.id,
            owner_id: self.owner_id,
            transfer_status: self.transfer_status,
            extraction_status: self.extraction_status,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewFile {
    pub owner_id: i64,
    pub filename: String,
    pub file_type: String,
    pub file_size: i64,
}

// API Request/Response types

fn default_top_k() -> usize {
    5
}

fn default_specialist() -> String {
    "general".to_string()
}

#[derive(Debug, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(min = 1, message = "query must not be empty"))]
    pub query: String,
    #[serde(default = "default_top_k")]
    #[validate(range(min = 1, max = 20))]
    pub top_k: usize,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SummaryRequest {
    #[serde(default = "default_specialist")]
    #[validate(length(min = 1, max = 64))]
    pub specialist_type: String,
    #[validate(length(max = 2000))]
    pub custom_prompt: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SummaryPdfRequest {
    #[serde(default = "default_specialist")]
    #[validate(length(min = 1, max = 64))]
    pub specialist_type: String,
    #[validate(length(max = 2000))]
    pub custom_prompt: Option<String>,
    #[serde(default)]
    pub file_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LatestSummaryQuery {
    #[serde(default = "default_specialist")]
    pub specialist_type: String,
}

#[derive(Debug, Serialize)]
pub struct FileUploadResponse {
    pub message: String,
    pub files: Vec<FileRecord>,
}

#[derive(Debug, Serialize)]
pub struct SummaryPdfResponse {
    pub summary_id: i64,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_url: Option<String>,
    pub specialist_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Job> for SummaryPdfResponse {
    fn from(job: Job) -> Self {
        let message = match job.status {
            JobStatus::Processing => "Summary PDF is being generated",
            JobStatus::Completed => "Summary PDF is ready",
            JobStatus::Failed => "Summary PDF generation failed",
        };
        Self {
            summary_id: job.id,
            status: job.status,
            s3_url: job.artifact_url,
            specialist_type: job.category,
            message: message.to_string(),
            failure_reason: job.failure_reason,
            created_at: job.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub database: String,
    pub answer_generator: bool,
    pub indexed_fragments: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_transitions() {
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Processing));
        for terminal in [JobStatus::Completed, JobStatus::Failed] {
            for next in [JobStatus::Processing, JobStatus::Completed, JobStatus::Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [JobStatus::Processing, JobStatus::Completed, JobStatus::Failed] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        for stage in [StageStatus::Pending, StageStatus::InProgress, StageStatus::Done, StageStatus::Failed] {
            assert_eq!(stage.as_str().parse::<StageStatus>().unwrap(), stage);
        }
        assert!("uploading".parse::<StageStatus>().is_err());
    }

    #[test]
    fn test_prerequisite_settled() {
        let mut record = PrerequisiteRecord {
            id: 1,
            owner_id: 1,
            transfer_status: StageStatus::Done,
            extraction_status: StageStatus::InProgress,
        };
        assert!(!record.is_settled());
        record.extraction_status = StageStatus::Failed;
        assert!(record.is_settled());
        assert!(record.has_failed_stage());
    }

    #[test]
    fn test_query_request_validation() {
        let ok: QueryRequest = serde_json::from_str(r#"{"query":"diabetes"}"#).unwrap();
        assert_eq!(ok.top_k, 5);
        assert!(ok.validate().is_ok());

        let empty: QueryRequest = serde_json::from_str(r#"{"query":"","top_k":3}"#).unwrap();
        assert!(empty.validate().is_err());

        let too_many: QueryRequest = serde_json::from_str(r#"{"query":"x","top_k":50}"#).unwrap();
        assert!(too_many.validate().is_err());
    }
}

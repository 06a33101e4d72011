use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;
use crate::models::{FileRecord, Job, JobStatus, NewFile, NewJob, PrerequisiteRecord, StageStatus};
use crate::types::AppResult;

pub mod memory;
pub mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

/// Persistence for summary jobs and uploaded file records
#[async_trait]
pub trait Repository: Send + Sync {
    async fn create_job(&self, job: NewJob) -> AppResult<Job>;

    async fn get_job(&self, id: i64) -> AppResult<Option<Job>>;

    /// Most recently created job for an owner and category, ties broken by higher id
    async fn get_latest_job(&self, owner_id: i64, category: &str) -> AppResult<Option<Job>>;

    /// Move a `processing` job to a terminal status. Returns false when the job is
    /// missing or already terminal, leaving it untouched.
    async fn update_job_status(
        &self,
        id: i64,
        status: JobStatus,
        failure_reason: Option<&str>,
    ) -> AppResult<bool>;

    /// Record the published artifact and mark the job `completed`
    async fn update_job_artifact(&self, id: i64, location: &str, url: &str) -> AppResult<bool>;

    /// Stage statuses for the given ids. Unknown ids are simply absent from the result.
    async fn get_prerequisite_statuses(&self, ids: &[i64]) -> AppResult<Vec<PrerequisiteRecord>>;

    async fn create_file(&self, file: NewFile) -> AppResult<FileRecord>;

    async fn update_transfer_status(&self, id: i64, status: StageStatus) -> AppResult<()>;

    /// Store the blob location and mark the transfer stage `done`
    async fn update_file_location(&self, id: i64, storage_key: &str, storage_url: &str) -> AppResult<()>;

    async fn update_extraction_status(&self, id: i64, status: StageStatus) -> AppResult<()>;

    async fn get_file(&self, id: i64) -> AppResult<Option<FileRecord>>;

    /// Newest first
    async fn list_owner_files(&self, owner_id: i64) -> AppResult<Vec<FileRecord>>;

    async fn owner_display_name(&self, owner_id: i64) -> AppResult<Option<String>>;

    async fn health_check(&self) -> AppResult<bool>;
}

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let url = config
        .url
        .as_deref()
        .ok_or_else(|| anyhow!("DATABASE_URL is not set"))?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect(url)
        .await?;

    // Test connection
    sqlx::query("SELECT 1").fetch_one(&pool).await?;

    Ok(pool)
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::db::Repository;
use crate::models::{FileRecord, Job, JobStatus, NewFile, NewJob, PrerequisiteRecord, StageStatus};
use crate::types::{AppError, AppResult};

const JOB_COLUMNS: &str = "id, owner_id, file_ids, specialist_type, custom_prompt, status, \
s3_key, s3_url, failure_reason, created_at, updated_at";

const FILE_COLUMNS: &str = "id, owner_id, filename, file_type, file_size, storage_key, storage_url, \
transfer_status, extraction_status, created_at, updated_at";

#[derive(Debug, FromRow)]
struct JobRow {
    id: i64,
    owner_id: i64,
    file_ids: Vec<i64>,
    specialist_type: String,
    custom_prompt: Option<String>,
    status: String,
    s3_key: Option<String>,
    s3_url: Option<String>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = AppError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: row.id,
            owner_id: row.owner_id,
            prerequisite_ids: row.file_ids,
            category: row.specialist_type,
            custom_prompt: row.custom_prompt,
            status: row.status.parse()?,
            artifact_location: row.s3_key,
            artifact_url: row.s3_url,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct FileRow {
    id: i64,
    owner_id: i64,
    filename: String,
    file_type: String,
    file_size: i64,
    storage_key: Option<String>,
    storage_url: Option<String>,
    transfer_status: String,
    extraction_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FileRow> for FileRecord {
    type Error = AppError;

    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        Ok(FileRecord {
            id: row.id,
            owner_id: row.owner_id,
            filename: row.filename,
            file_type: row.file_type,
            file_size: row.file_size,
            storage_key: row.storage_key,
            storage_url: row.storage_url,
            transfer_status: row.transfer_status.parse()?,
            extraction_status: row.extraction_status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PrerequisiteRow {
    id: i64,
    owner_id: i64,
    transfer_status: String,
    extraction_status: String,
}

/// PostgreSQL repository using runtime-checked `sqlx` queries
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn set_file_column(&self, id: i64, column: &str, status: StageStatus) -> AppResult<()> {
        let sql = format!(
            "UPDATE files SET {} = $2, updated_at = NOW() WHERE id = $1",
            column
        );
        sqlx::query(&sql)
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn create_job(&self, job: NewJob) -> AppResult<Job> {
        let sql = format!(
            "INSERT INTO summary_jobs (owner_id, file_ids, specialist_type, custom_prompt, status) \
             VALUES ($1, $2, $3, $4, 'processing') RETURNING {}",
            JOB_COLUMNS
        );
        let row: JobRow = sqlx::query_as(&sql)
            .bind(job.owner_id)
            .bind(&job.prerequisite_ids)
            .bind(&job.category)
            .bind(&job.custom_prompt)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn get_job(&self, id: i64) -> AppResult<Option<Job>> {
        let sql = format!("SELECT {} FROM summary_jobs WHERE id = $1", JOB_COLUMNS);
        let row: Option<JobRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Job::try_from).transpose()
    }

    async fn get_latest_job(&self, owner_id: i64, category: &str) -> AppResult<Option<Job>> {
        let sql = format!(
            "SELECT {} FROM summary_jobs WHERE owner_id = $1 AND specialist_type = $2 \
             ORDER BY created_at DESC, id DESC LIMIT 1",
            JOB_COLUMNS
        );
        let row: Option<JobRow> = sqlx::query_as(&sql)
            .bind(owner_id)
            .bind(category)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Job::try_from).transpose()
    }

    async fn update_job_status(
        &self,
        id: i64,
        status: JobStatus,
        failure_reason: Option<&str>,
    ) -> AppResult<bool> {
        if !JobStatus::Processing.can_transition_to(status) {
            return Ok(false);
        }
        let result = sqlx::query(
            "UPDATE summary_jobs SET status = $2, failure_reason = $3, updated_at = NOW() \
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(failure_reason)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_job_artifact(&self, id: i64, location: &str, url: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE summary_jobs SET s3_key = $2, s3_url = $3, status = 'completed', updated_at = NOW() \
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .bind(location)
        .bind(url)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_prerequisite_statuses(&self, ids: &[i64]) -> AppResult<Vec<PrerequisiteRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<PrerequisiteRow> = sqlx::query_as(
            "SELECT id, owner_id, transfer_status, extraction_status FROM files WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(PrerequisiteRecord {
                    id: row.id,
                    owner_id: row.owner_id,
                    transfer_status: row.transfer_status.parse()?,
                    extraction_status: row.extraction_status.parse()?,
                })
            })
            .collect()
    }

    async fn create_file(&self, file: NewFile) -> AppResult<FileRecord> {
        let sql = format!(
            "INSERT INTO files (owner_id, filename, file_type, file_size) VALUES ($1, $2, $3, $4) \
             RETURNING {}",
            FILE_COLUMNS
        );
        let row: FileRow = sqlx::query_as(&sql)
            .bind(file.owner_id)
            .bind(&file.filename)
            .bind(&file.file_type)
            .bind(file.file_size)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn update_transfer_status(&self, id: i64, status: StageStatus) -> AppResult<()> {
        self.set_file_column(id, "transfer_status", status).await
    }

    async fn update_file_location(&self, id: i64, storage_key: &str, storage_url: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE files SET storage_key = $2, storage_url = $3, transfer_status = 'done', \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(storage_key)
        .bind(storage_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_extraction_status(&self, id: i64, status: StageStatus) -> AppResult<()> {
        self.set_file_column(id, "extraction_status", status).await
    }

    async fn get_file(&self, id: i64) -> AppResult<Option<FileRecord>> {
        let sql = format!("SELECT {} FROM files WHERE id = $1", FILE_COLUMNS);
        let row: Option<FileRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(FileRecord::try_from).transpose()
    }

    async fn list_owner_files(&self, owner_id: i64) -> AppResult<Vec<FileRecord>> {
        let sql = format!(
            "SELECT {} FROM files WHERE owner_id = $1 ORDER BY created_at DESC, id DESC",
            FILE_COLUMNS
        );
        let rows: Vec<FileRow> = sqlx::query_as(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(FileRecord::try_from).collect()
    }

    async fn owner_display_name(&self, owner_id: i64) -> AppResult<Option<String>> {
        let name: Option<Option<String>> =
            sqlx::query_scalar("SELECT full_name FROM users WHERE id = $1")
                .bind(owner_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(name.flatten().filter(|n| !n.trim().is_empty()))
    }

    async fn health_check(&self) -> AppResult<bool> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(true)
    }
}

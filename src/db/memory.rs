// In-memory repository used when no DATABASE_URL is configured, and in tests

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::db::Repository;
use crate::models::{FileRecord, Job, JobStatus, NewFile, NewJob, PrerequisiteRecord, StageStatus};
use crate::types::{AppError, AppResult};

#[derive(Default)]
struct State {
    jobs: Vec<Job>,
    files: Vec<FileRecord>,
    owner_names: HashMap<i64, String>,
    next_job_id: i64,
    next_file_id: i64,
}

#[derive(Clone, Default)]
pub struct MemoryRepository {
    state: Arc<RwLock<State>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_owner_name(&self, owner_id: i64, name: &str) {
        self.state
            .write()
            .await
            .owner_names
            .insert(owner_id, name.to_string());
    }

    async fn update_file<F>(&self, id: i64, apply: F) -> AppResult<()>
    where
        F: FnOnce(&mut FileRecord) + Send,
    {
        let mut state = self.state.write().await;
        let file = state
            .files
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))?;
        apply(file);
        file.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_job(&self, job: NewJob) -> AppResult<Job> {
        let mut state = self.state.write().await;
        state.next_job_id += 1;
        let now = Utc::now();
        let job = Job {
            id: state.next_job_id,
            owner_id: job.owner_id,
            prerequisite_ids: job.prerequisite_ids,
            category: job.category,
            custom_prompt: job.custom_prompt,
            status: JobStatus::Processing,
            artifact_location: None,
            artifact_url: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };
        state.jobs.push(job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: i64) -> AppResult<Option<Job>> {
        Ok(self.state.read().await.jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn get_latest_job(&self, owner_id: i64, category: &str) -> AppResult<Option<Job>> {
        Ok(self
            .state
            .read()
            .await
            .jobs
            .iter()
            .filter(|j| j.owner_id == owner_id && j.category == category)
            .max_by_key(|j| (j.created_at, j.id))
            .cloned())
    }

    async fn update_job_status(
        &self,
        id: i64,
        status: JobStatus,
        failure_reason: Option<&str>,
    ) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let Some(job) = state.jobs.iter_mut().find(|j| j.id == id) else {
            return Ok(false);
        };
        if !job.status.can_transition_to(status) {
            return Ok(false);
        }
        job.status = status;
        job.failure_reason = failure_reason.map(str::to_string);
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn update_job_artifact(&self, id: i64, location: &str, url: &str) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let Some(job) = state.jobs.iter_mut().find(|j| j.id == id) else {
            return Ok(false);
        };
        if !job.status.can_transition_to(JobStatus::Completed) {
            return Ok(false);
        }
        job.status = JobStatus::Completed;
        job.artifact_location = Some(location.to_string());
        job.artifact_url = Some(url.to_string());
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn get_prerequisite_statuses(&self, ids: &[i64]) -> AppResult<Vec<PrerequisiteRecord>> {
        Ok(self
            .state
            .read()
            .await
            .files
            .iter()
            .filter(|f| ids.contains(&f.id))
            .map(FileRecord::prerequisite)
            .collect())
    }

    async fn create_file(&self, file: NewFile) -> AppResult<FileRecord> {
        let mut state = self.state.write().await;
        state.next_file_id += 1;
        let now = Utc::now();
        let record = FileRecord {
            id: state.next_file_id,
            owner_id: file.owner_id,
            filename: file.filename,
            file_type: file.file_type,
            file_size: file.file_size,
            storage_key: None,
            storage_url: None,
            transfer_status: StageStatus::Pending,
            extraction_status: StageStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        state.files.push(record.clone());
        Ok(record)
    }

    async fn update_transfer_status(&self, id: i64, status: StageStatus) -> AppResult<()> {
        self.update_file(id, |f| f.transfer_status = status).await
    }

    async fn update_file_location(&self, id: i64, storage_key: &str, storage_url: &str) -> AppResult<()> {
        let key = storage_key.to_string();
        let url = storage_url.to_string();
        self.update_file(id, move |f| {
            f.storage_key = Some(key);
            f.storage_url = Some(url);
            f.transfer_status = StageStatus::Done;
        })
        .await
    }

    async fn update_extraction_status(&self, id: i64, status: StageStatus) -> AppResult<()> {
        self.update_file(id, |f| f.extraction_status = status).await
    }

    async fn get_file(&self, id: i64) -> AppResult<Option<FileRecord>> {
        Ok(self.state.read().await.files.iter().find(|f| f.id == id).cloned())
    }

    async fn list_owner_files(&self, owner_id: i64) -> AppResult<Vec<FileRecord>> {
        let mut files: Vec<FileRecord> = self
            .state
            .read()
            .await
            .files
            .iter()
            .filter(|f| f.owner_id == owner_id)
            .cloned()
            .collect();
        files.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(files)
    }

    async fn owner_display_name(&self, owner_id: i64) -> AppResult<Option<String>> {
        Ok(self.state.read().await.owner_names.get(&owner_id).cloned())
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job(owner_id: i64, category: &str) -> NewJob {
        NewJob {
            owner_id,
            prerequisite_ids: vec![1, 2],
            category: category.to_string(),
            custom_prompt: None,
        }
    }

    fn new_file(owner_id: i64, name: &str) -> NewFile {
        NewFile {
            owner_id,
            filename: name.to_string(),
            file_type: "application/pdf".to_string(),
            file_size: 42,
        }
    }

    #[tokio::test]
    async fn test_job_status_is_monotonic() {
        let repo = MemoryRepository::new();
        let job = repo.create_job(new_job(1, "general")).await.unwrap();
        assert_eq!(job.status, JobStatus::Processing);

        assert!(repo
            .update_job_status(job.id, JobStatus::Failed, Some("boom"))
            .await
            .unwrap());
        assert!(!repo
            .update_job_status(job.id, JobStatus::Completed, None)
            .await
            .unwrap());
        assert!(!repo.update_job_artifact(job.id, "k", "u").await.unwrap());

        let stored = repo.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.failure_reason.as_deref(), Some("boom"));
        assert!(stored.artifact_location.is_none());
    }

    #[tokio::test]
    async fn test_artifact_marks_completed() {
        let repo = MemoryRepository::new();
        let job = repo.create_job(new_job(1, "general")).await.unwrap();
        assert!(repo
            .update_job_artifact(job.id, "summaries/1/general_1_abcd1234.pdf", "memory://x")
            .await
            .unwrap());

        let stored = repo.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(
            stored.artifact_location.as_deref(),
            Some("summaries/1/general_1_abcd1234.pdf")
        );
    }

    #[tokio::test]
    async fn test_latest_job_prefers_newest_then_highest_id() {
        let repo = MemoryRepository::new();
        let first = repo.create_job(new_job(1, "cardiologist")).await.unwrap();
        let second = repo.create_job(new_job(1, "cardiologist")).await.unwrap();
        repo.create_job(new_job(1, "general")).await.unwrap();
        repo.create_job(new_job(2, "cardiologist")).await.unwrap();

        let latest = repo.get_latest_job(1, "cardiologist").await.unwrap().unwrap();
        assert!(latest.id > first.id);
        assert_eq!(latest.id, second.id);
        assert!(repo.get_latest_job(3, "cardiologist").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prerequisite_statuses_skip_unknown_ids() {
        let repo = MemoryRepository::new();
        let file = repo.create_file(new_file(1, "labs.pdf")).await.unwrap();
        repo.update_file_location(file.id, "patients/1/1_x.pdf", "memory://patients/1/1_x.pdf")
            .await
            .unwrap();
        repo.update_extraction_status(file.id, StageStatus::Failed)
            .await
            .unwrap();

        let records = repo.get_prerequisite_statuses(&[file.id, 99]).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].transfer_status, StageStatus::Done);
        assert_eq!(records[0].extraction_status, StageStatus::Failed);
        assert!(records[0].is_settled());
    }

    #[tokio::test]
    async fn test_files_listed_newest_first() {
        let repo = MemoryRepository::new();
        repo.create_file(new_file(1, "a.pdf")).await.unwrap();
        repo.create_file(new_file(1, "b.pdf")).await.unwrap();
        repo.create_file(new_file(2, "c.pdf")).await.unwrap();

        let files = repo.list_owner_files(1).await.unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["b.pdf", "a.pdf"]);
    }

    #[tokio::test]
    async fn test_updating_missing_file_is_not_found() {
        let repo = MemoryRepository::new();
        let err = repo
            .update_transfer_status(5, StageStatus::InProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_owner_display_name() {
        let repo = MemoryRepository::new();
        assert!(repo.owner_display_name(1).await.unwrap().is_none());
        repo.set_owner_name(1, "Jane Doe").await;
        assert_eq!(repo.owner_display_name(1).await.unwrap().as_deref(), Some("Jane Doe"));
    }
}

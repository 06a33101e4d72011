//! Summary job orchestration.
//!
//! A job moves through: wait for its prerequisite files to settle, generate the summary
//! text, render it, publish the artifact. Each phase runs strictly after the previous
//! one. Every failure ends the job in `failed` with the error text as its reason; no
//! phase is retried. Status only ever moves out of `processing` once.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::db::Repository;
use crate::models::{Job, JobStatus, NewJob};
use crate::pipeline::{PipelineError, PipelineResult, SummaryGenerator};
use crate::queue::WorkerPools;
use crate::render::{RenderRequest, Renderer};
use crate::storage::{unique_suffix, BlobStore, ObjectMetadata};
use crate::types::{AppError, AppResult};

#[derive(Clone)]
pub struct PipelineController {
    inner: Arc<Inner>,
}

struct Inner {
    repository: Arc<dyn Repository>,
    summaries: SummaryGenerator,
    renderer: Arc<dyn Renderer>,
    store: Arc<dyn BlobStore>,
    pools: WorkerPools,
    config: PipelineConfig,
}

impl PipelineController {
    pub fn new(
        repository: Arc<dyn Repository>,
        summaries: SummaryGenerator,
        renderer: Arc<dyn Renderer>,
        store: Arc<dyn BlobStore>,
        pools: WorkerPools,
        config: PipelineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                repository,
                summaries,
                renderer,
                store,
                pools,
                config,
            }),
        }
    }

    /// Persist a new job and start it in the background. Returns the `processing` job.
    pub async fn submit(&self, job: NewJob) -> AppResult<Job> {
        let job = self.inner.repository.create_job(job).await?;
        info!(
            job_id = job.id,
            owner_id = job.owner_id,
            category = %job.category,
            prerequisites = job.prerequisite_ids.len(),
            "Submitted summary job"
        );

        let controller = self.clone();
        let spawned = job.clone();
        tokio::spawn(async move {
            controller.run(spawned).await;
        });

        Ok(job)
    }

    pub async fn get_job(&self, id: i64) -> AppResult<Option<Job>> {
        self.inner.repository.get_job(id).await
    }

    pub async fn latest_job(&self, owner_id: i64, category: &str) -> AppResult<Option<Job>> {
        self.inner.repository.get_latest_job(owner_id, category).await
    }

    /// Drive one job to a terminal status and return it
    pub async fn run(&self, job: Job) -> JobStatus {
        let started = Instant::now();
        match self.execute(&job).await {
            Ok(location) => {
                info!(
                    job_id = job.id,
                    location = %location,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Summary job completed"
                );
                JobStatus::Completed
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(job_id = job.id, reason = %reason, "Summary job failed");
                self.mark_failed(job.id, &reason).await;
                JobStatus::Failed
            }
        }
    }

    async fn execute(&self, job: &Job) -> PipelineResult<String> {
        self.wait_for_prerequisites(job).await?;

        let summary = self
            .inner
            .summaries
            .generate(job.owner_id, &job.category, job.custom_prompt.as_deref())
            .await
            .filter(|s| !s.summary.trim().is_empty())
            .ok_or(PipelineError::EmptyResult)?;
        debug!(job_id = job.id, chars = summary.summary.len(), "Summary text ready");

        let owner_display_name = self.inner.repository.owner_display_name(job.owner_id).await?;
        let request = RenderRequest {
            text: summary.summary,
            owner_display_name,
            category: job.category.clone(),
        };
        let renderer = self.inner.renderer.clone();
        let document = self
            .inner
            .pools
            .render
            .run_blocking(move || renderer.render(&request))
            .await?;

        Ok(self.publish(job, document).await?)
    }

    /// Poll prerequisite records until every one that exists has settled or the wait
    /// budget runs out. Ids with no record are logged and skipped.
    async fn wait_for_prerequisites(&self, job: &Job) -> PipelineResult<()> {
        let wanted: HashSet<i64> = job.prerequisite_ids.iter().copied().collect();
        if wanted.is_empty() {
            return Ok(());
        }

        let interval = self.inner.config.poll_interval();
        let budget = self.inner.config.wait_budget();
        let started = Instant::now();

        loop {
            let records = self
                .inner
                .repository
                .get_prerequisite_statuses(&job.prerequisite_ids)
                .await?;
            let pending = records.iter().filter(|r| !r.is_settled()).count();

            if pending == 0 {
                let found: HashSet<i64> = records.iter().map(|r| r.id).collect();
                let mut missing: Vec<i64> = wanted.difference(&found).copied().collect();
                if !missing.is_empty() {
                    missing.sort_unstable();
                    warn!(job_id = job.id, ?missing, "Prerequisite files not found, continuing");
                }
                let failed: Vec<i64> = records
                    .iter()
                    .filter(|r| r.has_failed_stage())
                    .map(|r| r.id)
                    .collect();
                if !failed.is_empty() {
                    warn!(job_id = job.id, ?failed, "Some prerequisite files failed, continuing");
                }
                return Ok(());
            }

            let waited = started.elapsed();
            if waited >= budget {
                return Err(PipelineError::Timeout {
                    waited_secs: waited.as_secs(),
                    pending,
                    total: records.len(),
                });
            }

            debug!(job_id = job.id, pending, "Waiting on prerequisite files");
            sleep(interval.min(budget - waited)).await;
        }
    }

    async fn publish(&self, job: &Job, document: Vec<u8>) -> AppResult<String> {
        let key = artifact_key(&self.inner.config.summary_key_prefix, job);
        let mut metadata = ObjectMetadata::new();
        metadata.insert("owner_id".to_string(), job.owner_id.to_string());
        metadata.insert("summary_id".to_string(), job.id.to_string());
        metadata.insert("specialist_type".to_string(), job.category.clone());

        let store = self.inner.store.clone();
        let content_type = self.inner.renderer.content_type();
        let url = self
            .inner
            .pools
            .storage
            .run(store.put(Bytes::from(document), &key, content_type, &metadata))
            .await?;

        let recorded = self
            .inner
            .repository
            .update_job_artifact(job.id, &key, &url)
            .await;

        match recorded {
            Ok(true) => Ok(key),
            Ok(false) => {
                self.discard_artifact(&key).await;
                Err(AppError::Internal(format!(
                    "job {} was no longer processing when its artifact was recorded",
                    job.id
                )))
            }
            Err(e) => {
                self.discard_artifact(&key).await;
                Err(e)
            }
        }
    }

    async fn discard_artifact(&self, key: &str) {
        if let Err(e) = self.inner.store.delete(key).await {
            error!(key, error = %e, "Failed to delete unrecorded artifact");
        }
    }

    /// Record the failure reason. If this write itself fails the job stays `processing`
    /// in the repository; only the error log records the outcome.
    async fn mark_failed(&self, job_id: i64, reason: &str) {
        match self
            .inner
            .repository
            .update_job_status(job_id, JobStatus::Failed, Some(reason))
            .await
        {
            Ok(true) => {}
            Ok(false) => debug!(job_id, "Job already terminal, failure not recorded"),
            Err(e) => error!(job_id, error = %e, "Failed to record job failure"),
        }
    }
}

/// `{prefix}/{owner}/{category}_{job}_{suffix}.pdf`
fn artifact_key(prefix: &str, job: &Job) -> String {
    let prefix = prefix.trim_matches('/');
    let category: String = job
        .category
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    let name = format!("{}_{}_{}.pdf", category, job.id, unique_suffix());
    if prefix.is_empty() {
        format!("{}/{}", job.owner_id, name)
    } else {
        format!("{}/{}/{}", prefix, job.owner_id, name)
    }
}

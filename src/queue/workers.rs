//! Bounded worker pools.
//!
//! Each pool is a semaphore capping how many operations of one kind run at once.
//! Blob transfers, text extraction and rendering each get their own pool. CPU-bound
//! work runs on the blocking thread pool while the permit is held.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::trace;

use crate::config::PipelineConfig;
use crate::types::{AppError, AppResult};

#[derive(Debug)]
pub struct WorkerPool {
    name: &'static str,
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl WorkerPool {
    /// A zero capacity is raised to one so the pool can always make progress
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name,
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Relaxed)
    }

    /// Run an async operation once a permit is available
    pub async fn run<F, T>(&self, operation: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| AppError::Internal(format!("{} pool is closed", self.name)))?;
        let _guard = self.enter();
        operation.await
    }

    /// Run a CPU-bound closure on the blocking thread pool once a permit is available
    pub async fn run_blocking<F, T>(&self, work: F) -> AppResult<T>
    where
        F: FnOnce() -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| AppError::Internal(format!("{} pool is closed", self.name)))?;
        let _guard = self.enter();
        tokio::task::spawn_blocking(work)
            .await
            .map_err(|e| AppError::Internal(format!("{} worker panicked: {}", self.name, e)))?
    }

    fn enter(&self) -> InFlightGuard<'_> {
        let current = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::Relaxed);
        trace!(pool = self.name, in_flight = current, "Worker started");
        InFlightGuard {
            in_flight: &self.in_flight,
        }
    }
}

struct InFlightGuard<'a> {
    in_flight: &'a AtomicUsize,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// The three pools shared by ingest and the summary pipeline
#[derive(Debug, Clone)]
pub struct WorkerPools {
    pub storage: Arc<WorkerPool>,
    pub extraction: Arc<WorkerPool>,
    pub render: Arc<WorkerPool>,
}

impl WorkerPools {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            storage: Arc::new(WorkerPool::new("storage", config.storage_workers)),
            extraction: Arc::new(WorkerPool::new("extraction", config.extraction_workers)),
            render: Arc::new(WorkerPool::new("render", config.render_workers)),
        }
    }
}

impl Default for WorkerPools {
    fn default() -> Self {
        Self::new(&PipelineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_pool_caps_concurrency() {
        let pool = Arc::new(WorkerPool::new("test", 2));
        let tasks = (0..6).map(|i| {
            let pool = pool.clone();
            async move {
                pool.run(async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(i)
                })
                .await
            }
        });

        let mut results: Vec<i32> = join_all(tasks)
            .await
            .into_iter()
            .collect::<AppResult<_>>()
            .unwrap();
        results.sort();
        assert_eq!(results, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(pool.peak_in_flight(), 2);
        assert_eq!(pool.in_flight(), 0);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_run_blocking_propagates_errors() {
        let pool = WorkerPool::new("render", 1);
        let ok = pool.run_blocking(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(ok, 42);

        let err = pool
            .run_blocking(|| -> AppResult<()> { Err(AppError::Render("bad layout".to_string())) })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Render(_)));
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn test_pools_from_config() {
        let pools = WorkerPools::default();
        assert_eq!(pools.storage.capacity(), 5);
        assert_eq!(pools.extraction.capacity(), 3);
        assert_eq!(pools.render.capacity(), 2);
        assert_eq!(WorkerPool::new("zero", 0).capacity(), 1);
    }
}

// Summary PDF pipeline: job orchestration and summary generation

use thiserror::Error;

use crate::types::AppError;

pub mod controller;
pub mod summary;

pub use controller::PipelineController;
pub use summary::{Summary, SummaryGenerator, SummarySection};

/// Why a summary job ended in `failed`
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("prerequisites incomplete after {waited_secs}s ({pending} of {total} not finished)")]
    Timeout {
        waited_secs: u64,
        pending: usize,
        total: usize,
    },

    #[error("no data found")]
    EmptyResult,

    #[error(transparent)]
    Upstream(#[from] AppError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

//! API Routes
//!
//! - `/api/health`, `/api/specialists` - service status and summary categories
//! - `/api/patients/{owner_id}/files` - uploads and their processing status
//! - `/api/patients/{owner_id}/documents` - indexed sources
//! - `/api/patients/{owner_id}/query` - question answering over indexed records
//! - `/api/patients/{owner_id}/summary` - synchronous specialist summary
//! - `/api/patients/{owner_id}/summary-pdfs`, `/api/summary-pdfs/{id}` - summary PDF jobs

pub mod files;
pub mod health;
pub mod query;
pub mod summaries;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;
use validator::Validate;

use crate::middleware::cors_layer;
use crate::models::AppState;
use crate::types::{AppError, AppResult};

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");
    let cors = cors_layer(&state.config.server.cors_allowed_origins);

    Router::new()
        .merge(health::router(state.clone()))
        .merge(files::router(state.clone()))
        .merge(query::router(state.clone()))
        .merge(summaries::router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub(crate) fn validate<T: Validate>(payload: &T) -> AppResult<()> {
    payload
        .validate()
        .map_err(|e| AppError::InvalidRequest(e.to_string()))
}

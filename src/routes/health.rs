use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use tracing::warn;

use crate::models::{AppState, HealthResponse};
use crate::pipeline::summary::available_specialists;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/specialists", get(list_specialists))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database_ok = match state.repository.health_check().await {
        Ok(ok) => ok,
        Err(e) => {
            warn!(error = %e, "Database health check failed");
            false
        }
    };

    Json(HealthResponse {
        status: if database_ok { "ok" } else { "degraded" }.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        database: if database_ok { "connected" } else { "unavailable" }.to_string(),
        answer_generator: state.summaries.has_generator(),
        indexed_fragments: state.index.len().await,
    })
}

async fn list_specialists() -> Json<Value> {
    Json(json!({ "specialists": available_specialists() }))
}

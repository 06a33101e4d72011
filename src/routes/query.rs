use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use tracing::info;

use crate::models::{AppState, QueryRequest};
use crate::retrieval::RetrievalAnswer;
use crate::routes::validate;
use crate::types::AppResult;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/patients/{owner_id}/query", post(query_records))
        .with_state(state)
}

async fn query_records(
    State(state): State<AppState>,
    Path(owner_id): Path<i64>,
    Json(payload): Json<QueryRequest>,
) -> AppResult<Json<RetrievalAnswer>> {
    validate(&payload)?;
    info!(owner_id, top_k = payload.top_k, "Record query received");

    let answer = state
        .retrieval
        .answer(payload.query.trim(), owner_id, payload.top_k)
        .await;
    Ok(Json(answer))
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use crate::models::{
    AppState, LatestSummaryQuery, NewJob, SummaryPdfRequest, SummaryPdfResponse, SummaryRequest,
};
use crate::pipeline::summary::NO_RECORDS_MESSAGE;
use crate::pipeline::Summary;
use crate::routes::validate;
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/patients/{owner_id}/summary", post(generate_summary))
        .route("/api/patients/{owner_id}/summary-pdfs", post(create_summary_pdf))
        .route("/api/patients/{owner_id}/summary-pdfs/latest", get(latest_summary_pdf))
        .route("/api/summary-pdfs/{id}", get(get_summary_pdf))
        .with_state(state)
}

async fn generate_summary(
    State(state): State<AppState>,
    Path(owner_id): Path<i64>,
    Json(payload): Json<SummaryRequest>,
) -> AppResult<Json<Summary>> {
    validate(&payload)?;
    info!(owner_id, specialist_type = %payload.specialist_type, "Summary request received");

    let summary = state
        .summaries
        .generate(owner_id, &payload.specialist_type, payload.custom_prompt.as_deref())
        .await
        .unwrap_or_else(|| Summary {
            summary: NO_RECORDS_MESSAGE.to_string(),
            sections: Vec::new(),
            sources: Vec::new(),
            specialist_type: payload.specialist_type.clone(),
            note: None,
        });
    Ok(Json(summary))
}

async fn create_summary_pdf(
    State(state): State<AppState>,
    Path(owner_id): Path<i64>,
    Json(payload): Json<SummaryPdfRequest>,
) -> AppResult<(StatusCode, Json<SummaryPdfResponse>)> {
    validate(&payload)?;

    let job = state
        .pipeline
        .submit(NewJob {
            owner_id,
            prerequisite_ids: payload.file_ids,
            category: payload.specialist_type,
            custom_prompt: payload.custom_prompt,
        })
        .await?;
    Ok((StatusCode::ACCEPTED, Json(job.into())))
}

async fn latest_summary_pdf(
    State(state): State<AppState>,
    Path(owner_id): Path<i64>,
    Query(params): Query<LatestSummaryQuery>,
) -> AppResult<Json<SummaryPdfResponse>> {
    let job = state
        .pipeline
        .latest_job(owner_id, &params.specialist_type)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "No {} summary PDF for patient {}",
                params.specialist_type, owner_id
            ))
        })?;
    Ok(Json(job.into()))
}

async fn get_summary_pdf(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<SummaryPdfResponse>> {
    let job = state
        .pipeline
        .get_job(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Summary PDF {}", id)))?;
    Ok(Json(job.into()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use serde_json::{json, Value};

    use crate::models::AppState;
    use crate::pipeline::summary::NO_RECORDS_MESSAGE;
    use crate::retrieval::FragmentAttributes;
    use crate::routes::testing::{get, post_json, send, test_state};

    async fn wait_for_terminal(state: &AppState, id: i64) -> Value {
        for _ in 0..200 {
            let (_, body) = send(state, get(&format!("/api/summary-pdfs/{}", id))).await;
            if body["status"] != "processing" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("summary job {} never finished", id);
    }

    #[tokio::test]
    async fn test_summary_without_records() {
        let (state, _) = test_state();
        let (status, body) = send(
            &state,
            post_json("/api/patients/8/summary", json!({ "specialist_type": "cardiologist" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"], NO_RECORDS_MESSAGE);
        assert!(body["sections"].as_array().unwrap().is_empty());
        assert_eq!(body["specialist_type"], "cardiologist");
    }

    #[tokio::test]
    async fn test_summary_pdf_completes_and_is_latest() {
        let (state, _) = test_state();
        state
            .index
            .insert(
                vec![(
                    "Active medications: metformin 500mg, lisinopril 10mg".to_string(),
                    FragmentAttributes::new(),
                )],
                6,
                21,
                "meds.txt",
                None,
            )
            .await;

        let (status, body) = send(
            &state,
            post_json("/api/patients/6/summary-pdfs", json!({ "specialist_type": "general" })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "processing");
        let id = body["summary_id"].as_i64().unwrap();

        let done = wait_for_terminal(&state, id).await;
        assert_eq!(done["status"], "completed");
        assert!(done["s3_url"].as_str().unwrap().starts_with("memory://summaries/6/"));

        let (status, latest) = send(
            &state,
            get("/api/patients/6/summary-pdfs/latest?specialist_type=general"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(latest["summary_id"], id);
    }

    #[tokio::test]
    async fn test_summary_pdf_without_records_fails() {
        let (state, _) = test_state();
        let (_, body) = send(&state, post_json("/api/patients/7/summary-pdfs", json!({}))).await;
        let done = wait_for_terminal(&state, body["summary_id"].as_i64().unwrap()).await;
        assert_eq!(done["status"], "failed");
        assert_eq!(done["failure_reason"], "no data found");
    }

    #[tokio::test]
    async fn test_missing_jobs_are_not_found() {
        let (state, _) = test_state();
        let (status, _) = send(&state, get("/api/summary-pdfs/999")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&state, get("/api/patients/1/summary-pdfs/latest")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

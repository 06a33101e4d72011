use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tracing::info;

use crate::ingest::Upload;
use crate::models::{AppState, FileRecord, FileUploadResponse};
use crate::types::{AppError, AppResult};

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/patients/{owner_id}/files",
            get(list_files).post(upload_files),
        )
        .route("/api/patients/{owner_id}/documents", get(list_documents))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Accept every file part of a multipart body. Processing continues in the background.
async fn upload_files(
    State(state): State<AppState>,
    Path(owner_id): Path<i64>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<FileUploadResponse>)> {
    let mut uploads = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidRequest(format!("Malformed multipart body: {}", e)))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidRequest(format!("Failed to read {}: {}", filename, e)))?;
        uploads.push(Upload {
            filename,
            content_type,
            data,
        });
    }

    if uploads.is_empty() {
        return Err(AppError::InvalidRequest("No files provided".to_string()));
    }

    info!(owner_id, count = uploads.len(), "File upload request received");

    let mut files = Vec::with_capacity(uploads.len());
    for upload in uploads {
        files.push(state.ingest.upload(owner_id, upload).await?);
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(FileUploadResponse {
            message: format!("{} file(s) accepted for processing", files.len()),
            files,
        }),
    ))
}

async fn list_files(
    State(state): State<AppState>,
    Path(owner_id): Path<i64>,
) -> AppResult<Json<Vec<FileRecord>>> {
    Ok(Json(state.ingest.list_files(owner_id).await?))
}

async fn list_documents(State(state): State<AppState>, Path(owner_id): Path<i64>) -> Json<Value> {
    let documents = state.index.list_by_owner(owner_id).await;
    Json(json!({
        "owner_id": owner_id,
        "count": documents.len(),
        "documents": documents,
    }))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    use crate::db::Repository;
    use crate::routes::testing::{get, send, test_state};

    const BOUNDARY: &str = "patient-summary-boundary";

    fn multipart_request(uri: &str, parts: &[(&str, &str, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (filename, content_type, content) in parts {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n{content}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_and_list() {
        let (state, repository) = test_state();
        let request = multipart_request(
            "/api/patients/4/files",
            &[
                ("labs.txt", "text/plain", "Cholesterol LDL 160 mg/dL"),
                ("notes.txt", "text/plain", "Patient reports mild headaches"),
            ],
        );
        let (status, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let files = body["files"].as_array().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0]["transfer_status"], "pending");

        let first_id = files[0]["id"].as_i64().unwrap();
        for _ in 0..200 {
            let file = repository.get_file(first_id).await.unwrap().unwrap();
            if file.prerequisite().is_settled() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let (status, body) = send(&state, get("/api/patients/4/files")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (_, body) = send(&state, get("/api/patients/5/files")).await;
        assert!(body.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_without_files_rejected() {
        let (state, _) = test_state();
        let (status, body) = send(&state, multipart_request("/api/patients/4/files", &[])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("No files"));
    }

    #[tokio::test]
    async fn test_documents_empty_for_new_owner() {
        let (state, _) = test_state();
        let (status, body) = send(&state, get("/api/patients/9/documents")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);
    }
}

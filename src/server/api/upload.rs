//! File upload and the upload-to-job bridge.
//!
//! Grounded on `original_source/backend-bulk/app/api/v1/upload.py`'s
//! `upload_files`/`create_job_with_files`: PDFs land under a per-session
//! storage key, a filenames manifest maps storage key back to the name the
//! caller uploaded, and a job is created pointing at that session.

use axum::extract::{Multipart, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Job, SourceKind};
use crate::server::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct UploadQuery {
    /// An existing session to append to. Absent on the first upload of a
    /// session, in which case a fresh one is minted.
    pub session_id: Option<String>,
}

/// `POST /upload-files`: accepts one or more PDF parts, stores each under a
/// session, and merges their names into that session's filenames manifest
/// (merged rather than overwritten, since a session may be uploaded to in
/// more than one request).
pub async fn upload_files(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Json<Value>> {
    let session_id = query.session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let mut manifest = match state.storage.get_filenames_manifest(&session_id).await {
        Ok(m) => m,
        Err(AppError::NotFound(_)) => Default::default(),
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("malformed multipart body: {e}")))?
    {
        let original_filename = field.file_name().unwrap_or("upload.pdf").to_string();
        if !original_filename.to_lowercase().ends_with(".pdf") {
            tracing::warn!(filename = %original_filename, "skipping non-pdf upload part");
            continue;
        }
        let content_type = field.content_type().unwrap_or("application/pdf").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidInput(format!("reading upload part: {e}")))?;

        let object_ref = state.storage.put(&session_id, &bytes, &content_type).await?;
        manifest.insert(object_ref.key.clone(), original_filename.clone());
        files.push(json!({
            "storageKey": object_ref.key,
            "originalFilename": original_filename,
        }));
    }

    state.storage.put_filenames_manifest(&session_id, &manifest).await?;

    Ok(Json(json!({
        "success": true,
        "session_id": session_id,
        "upload_path": session_id,
        "files": files,
        "total_files": files.len(),
        "message": format!("Uploaded {} files successfully", files.len()),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobWithFilesRequest {
    #[allow(dead_code)]
    pub job_name: Option<String>,
    #[allow(dead_code)]
    pub upload_path: Option<String>,
    pub session_id: String,
    pub document_type: Option<String>,
}

/// `POST /create-job-with-files`: creates a job pointing at an already
/// uploaded session. `jobName`/`uploadPath` are accepted but not modeled
/// (DESIGN.md decision 6).
pub async fn create_job_with_files(
    State(state): State<AppState>,
    Json(body): Json<CreateJobWithFilesRequest>,
) -> Result<Json<Value>> {
    let job = Job::new(SourceKind::UploadSession, body.session_id.clone(), body.document_type);
    state.jobs.create(&job).await?;
    Ok(Json(json!({
        "success": true,
        "job": job,
        "message": "job created",
        "sessionId": body.session_id,
    })))
}

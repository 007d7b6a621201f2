//! Job CRUD, lifecycle control, and the upload-size estimate endpoint.
//!
//! Grounded on `server/handlers.rs`'s `State<AppState>` + `Json<Value>`
//! handler shape, generalized from the FOIA browse UI's source/document
//! listing to job/document listing here.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::broker::Task;
use crate::error::{AppError, Result};
use crate::models::{Job, JobStatus, SourceKind};
use crate::server::api::helpers::job_with_review_count;
use crate::server::AppState;
use crate::storage::SourceConfig;

/// A manifest is never treated as larger than this for estimation purposes;
/// past it we report "at least N" rather than walking further (§6).
const ESTIMATE_CAP: usize = 5000;

fn extract_str(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| value.get(k).and_then(|v| v.as_str()).map(str::to_string))
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    #[allow(dead_code)]
    pub name: Option<String>,
    pub source_type: Option<String>,
    pub source_config: Value,
    pub processing_config: Option<Value>,
    #[allow(dead_code)]
    pub processing_options: Option<Value>,
}

/// Resolve a request's `source_type` + `source_config` into the tagged
/// `(SourceKind, source_location)` pair `Job::new` needs. `source_type`
/// defaults to `upload_session` for compatibility with callers that only
/// ever spoke the upload-session shape.
fn resolve_source(source_type: Option<&str>, source_config: &Value) -> Result<(SourceKind, String)> {
    match source_type.unwrap_or("upload_session") {
        "upload_session" => {
            let session_id = extract_str(source_config, &["sessionId", "session_id"])
                .ok_or_else(|| AppError::InvalidInput("source_config must carry a sessionId".to_string()))?;
            Ok((SourceKind::UploadSession, session_id))
        }
        "folder" => {
            let path = extract_str(source_config, &["path"])
                .ok_or_else(|| AppError::InvalidInput("source_config must carry a path".to_string()))?;
            Ok((SourceKind::Folder, path))
        }
        "remote_drive" => Err(AppError::InvalidInput(
            "remote-drive sources require a provider OAuth flow this crate does not implement".to_string(),
        )),
        other => Err(AppError::InvalidInput(format!("unknown source_type {other}"))),
    }
}

/// `POST /bulk-jobs`. `source_type`/`source_config` resolve to the job's
/// tagged source descriptor and are validated against the Storage Gateway
/// before the job is created; `document_type`/`template_id` survive out of
/// `processing_config`, the rest of the request's config blob is accepted
/// for API-surface compatibility but not modeled (DESIGN.md decision 6).
pub async fn create_job(State(state): State<AppState>, Json(body): Json<CreateJobRequest>) -> Result<(axum::http::StatusCode, Json<Job>)> {
    let (source_kind, source_location) = resolve_source(body.source_type.as_deref(), &body.source_config)?;
    let document_type = body
        .processing_config
        .as_ref()
        .and_then(|c| extract_str(c, &["documentType", "document_type"]));
    let template_id = body
        .processing_config
        .as_ref()
        .and_then(|c| extract_str(c, &["templateId", "template_id"]));

    let config = match source_kind {
        SourceKind::UploadSession => SourceConfig::UploadSession { session_id: source_location.clone() },
        SourceKind::Folder => SourceConfig::Folder { path: source_location.clone(), file_types: vec!["pdf".to_string()] },
    };
    state.storage.validate(&config).await?;

    let mut job = Job::new(source_kind, source_location, document_type);
    job.template_id = template_id;
    state.jobs.create(&job).await?;
    Ok((axum::http::StatusCode::CREATED, Json(job)))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    #[serde(default)]
    pub skip: i64,
    pub limit: Option<i64>,
    pub status_filter: Option<String>,
}

pub async fn list_jobs(State(state): State<AppState>, Query(query): Query<ListJobsQuery>) -> Result<Json<Value>> {
    let status_filter = query
        .status_filter
        .as_deref()
        .map(|s| JobStatus::from_str(s).ok_or_else(|| AppError::InvalidInput(format!("unknown status_filter {s}"))))
        .transpose()?;
    let limit = crate::server::api::helpers::clamp_limit(query.limit);
    let rows = state.jobs.list_page(status_filter, query.skip, limit).await?;
    let total = state.jobs.count(status_filter).await?;

    let mut jobs = Vec::with_capacity(rows.len());
    for job in &rows {
        jobs.push(job_with_review_count(&state, job).await?);
    }
    Ok(Json(json!({ "jobs": jobs, "total": total, "skip": query.skip, "limit": limit })))
}

pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<Json<Job>> {
    Ok(Json(state.jobs.get(&job_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateJobRequest {
    pub document_type: Option<Option<String>>,
    pub template_id: Option<Option<String>>,
    pub priority: Option<i32>,
}

pub async fn update_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(body): Json<UpdateJobRequest>,
) -> Result<Json<Job>> {
    // Priority is clamped rather than rejected outright: an out-of-range
    // request still expresses clear intent (push to the front/back of the
    // queue) and §4.H only documents 1-5 as the meaningful range.
    let priority = body.priority.map(crate::models::clamp_priority);
    state
        .jobs
        .update_config(&job_id, body.document_type, body.template_id, priority)
        .await?;
    Ok(Json(state.jobs.get(&job_id).await?))
}

pub async fn delete_job(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<axum::http::StatusCode> {
    crate::server::delete_job_cascade(&state, &job_id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// `POST /bulk-jobs/{id}/start`: transitions the job to `discovering` and
/// enqueues the broker task that walks its upload session (§4.F's
/// documented precondition).
pub async fn start_job(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<Json<Job>> {
    let job = state.jobs.get(&job_id).await?;
    state.lifecycle.start(&job).await?;
    let task = Task::new(
        "discover_job",
        &json!({ "job_id": job_id }),
        job.priority,
        state.broker_config.max_attempts as i32,
    );
    state.queue.enqueue(&task).await?;
    Ok(Json(state.jobs.get(&job_id).await?))
}

pub async fn pause_job(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<Json<Job>> {
    let job = state.jobs.get(&job_id).await?;
    state.lifecycle.pause(&job).await?;
    Ok(Json(state.jobs.get(&job_id).await?))
}

pub async fn resume_job(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<Json<Job>> {
    let job = state.jobs.get(&job_id).await?;
    state.lifecycle.resume(&job).await?;
    Ok(Json(state.jobs.get(&job_id).await?))
}

pub async fn stop_job(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<Json<Job>> {
    let job = state.jobs.get(&job_id).await?;
    state.lifecycle.stop(&job).await?;
    Ok(Json(state.jobs.get(&job_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct EstimateRequest {
    pub session_id: Option<String>,
    pub source_type: Option<String>,
    pub source_config: Option<Value>,
}

/// `POST /estimate`: counts a source through the Storage Gateway, capped at
/// 5000 (§6). Grounded on `original_source/backend-bulk/app/api/v1/
/// jobs.py`'s folder-counting `/estimate` endpoint. `session_id` alone is
/// accepted as shorthand for an upload-session `source_config`.
pub async fn estimate(State(state): State<AppState>, Json(body): Json<EstimateRequest>) -> Result<Json<Value>> {
    let config = match (body.session_id, body.source_config) {
        (Some(session_id), _) => SourceConfig::UploadSession { session_id },
        (None, Some(source_config)) => {
            let (kind, location) = resolve_source(body.source_type.as_deref(), &source_config)?;
            match kind {
                SourceKind::UploadSession => SourceConfig::UploadSession { session_id: location },
                SourceKind::Folder => SourceConfig::Folder { path: location, file_types: vec!["pdf".to_string()] },
            }
        }
        (None, None) => return Err(AppError::InvalidInput("estimate requires session_id or source_config".to_string())),
    };
    let count = state.storage.count(&config, ESTIMATE_CAP).await?;
    if count >= ESTIMATE_CAP {
        return Ok(Json(json!({
            "estimated_documents": ESTIMATE_CAP,
            "message": format!("Found at least {ESTIMATE_CAP} documents (may be more)"),
        })));
    }
    Ok(Json(json!({
        "estimated_documents": count,
        "message": format!("Found {count} documents"),
    })))
}

//! Per-job document listing and single-document retry.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, Result};
use crate::models::DocumentStatus;
use crate::server::api::helpers::clamp_limit;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct ListDocumentsQuery {
    #[serde(default)]
    pub skip: i64,
    pub limit: Option<i64>,
    pub status_filter: Option<String>,
}

pub async fn list_documents(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<Json<Value>> {
    let status_filter = query
        .status_filter
        .as_deref()
        .map(|s| DocumentStatus::from_str(s).ok_or_else(|| AppError::InvalidInput(format!("unknown status_filter {s}"))))
        .transpose()?;
    let limit = clamp_limit(query.limit);
    let rows = state
        .documents
        .list_by_job_page(&job_id, status_filter, query.skip, limit)
        .await?;
    let total = state.documents.count_by_job(&job_id, status_filter).await?;
    Ok(Json(json!({ "documents": rows, "total": total, "skip": query.skip, "limit": limit })))
}

/// `POST /bulk-jobs/{id}/documents/{doc}/retry`: requeues a terminal,
/// retry-eligible document (§4.G) and re-enqueues its extraction task.
pub async fn retry_document(
    State(state): State<AppState>,
    Path((job_id, document_id)): Path<(String, String)>,
) -> Result<Json<Value>> {
    state.lifecycle.retry_document(&job_id, &document_id).await?;
    let document = state.documents.get(&document_id).await?;
    let task = crate::broker::Task::new(
        "extract_document",
        &json!({ "document_id": document_id }),
        0,
        state.broker_config.max_attempts as i32,
    );
    state.queue.enqueue(&task).await?;
    Ok(Json(json!({ "document": document })))
}

//! Review-queue listing and per-item retry/resolve, grounded on
//! `original_source/backend-bulk/app/api/v1/review_queue.py` — a listing
//! across every job (not scoped to one), `retry` that requeues the
//! underlying document, and `resolve` that marks the flag handled.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, Result};
use crate::models::{ReviewQueueItem, ReviewStatus};
use crate::server::api::helpers::clamp_limit;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct ListReviewQueueQuery {
    #[serde(default)]
    pub skip: i64,
    pub limit: Option<i64>,
    pub status: Option<String>,
}

pub async fn list_review_queue(State(state): State<AppState>, Query(query): Query<ListReviewQueueQuery>) -> Result<Json<Value>> {
    let limit = clamp_limit(query.limit);
    let status_filter = query
        .status
        .as_deref()
        .map(|s| ReviewStatus::from_str(s).ok_or_else(|| AppError::InvalidInput(format!("unknown status {s}"))))
        .transpose()?;
    let rows = state.review_queue.list_page(status_filter, query.skip, limit).await?;
    Ok(Json(json!({ "items": rows, "skip": query.skip, "limit": limit })))
}

pub async fn get_review_item(State(state): State<AppState>, Path(item_id): Path<String>) -> Result<Json<ReviewQueueItem>> {
    Ok(Json(state.review_queue.get(&item_id).await?))
}

/// Retries the item's underlying document and resolves the flag, the same
/// net effect as the original's "removed from queue on retry" behavior.
pub async fn retry_review_item(State(state): State<AppState>, Path(item_id): Path<String>) -> Result<Json<Value>> {
    let item = state.review_queue.get(&item_id).await?;
    state.lifecycle.retry_document(&item.job_id, &item.document_id).await?;
    let task = crate::broker::Task::new(
        "extract_document",
        &json!({ "document_id": item.document_id }),
        item.priority,
        state.broker_config.max_attempts as i32,
    );
    state.queue.enqueue(&task).await?;
    state.review_queue.resolve(&item_id).await?;
    Ok(Json(json!({ "item_id": item_id, "retried": true })))
}

#[derive(Debug, Deserialize, Default)]
pub struct ResolveReviewItemRequest {
    /// Accepted for request-shape compatibility; `ReviewQueueItem` carries
    /// no free-text notes field, so this is not persisted.
    #[allow(dead_code)]
    pub notes: Option<String>,
}

pub async fn resolve_review_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    body: Option<Json<ResolveReviewItemRequest>>,
) -> Result<Json<Value>> {
    let _ = body;
    state.review_queue.resolve(&item_id).await?;
    Ok(Json(json!({ "item_id": item_id, "resolved": true })))
}

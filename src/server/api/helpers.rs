//! Small pieces shared by every handler module: pagination query params and
//! the aggregate needs-review count job listings carry.

use serde_json::{json, Value};

use crate::error::Result;
use crate::models::Job;
use crate::server::AppState;

/// `?limit=` clamping shared by every list endpoint: defaults to 100, capped
/// at 1000, matching the review-queue listing convention this crate's
/// pagination is grounded on. Each endpoint's query struct declares its own
/// `skip`/`limit` fields directly rather than nesting a shared struct with
/// `#[serde(flatten)]` — `serde_urlencoded`, which axum's `Query` extractor
/// is built on, doesn't support flattening.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(100).clamp(1, 1000)
}

/// Render a job alongside its unresolved review-queue count, the shape
/// `GET /bulk-jobs` promises ("aggregate needs-review count per job").
pub async fn job_with_review_count(state: &AppState, job: &Job) -> Result<Value> {
    let needs_review = state.review_queue.count_unresolved_for_job(&job.id).await?;
    Ok(json!({
        "job": job,
        "needsReviewCount": needs_review,
    }))
}

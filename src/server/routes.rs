//! Router assembly: every route from spec's external interfaces list (§6),
//! wired to the handler modules under `server::api`.
//!
//! Grounded on the teacher's own `create_router` (`Router::new().route(...)`
//! chains plus a `tower-http` CORS/trace layer stack), generalized from the
//! FOIA browse UI's routes to this crate's job/document/review-queue/
//! template/upload/export/websocket surface. Uses axum 0.7's `{param}` path
//! syntax throughout (the teacher's `:param` syntax predates the upgrade).

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::api::{documents, export, jobs, review_queue, templates, upload, ws};
use super::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/bulk-jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route(
            "/bulk-jobs/{id}",
            get(jobs::get_job).put(jobs::update_job).delete(jobs::delete_job),
        )
        .route("/bulk-jobs/{id}/start", post(jobs::start_job))
        .route("/bulk-jobs/{id}/pause", post(jobs::pause_job))
        .route("/bulk-jobs/{id}/resume", post(jobs::resume_job))
        .route("/bulk-jobs/{id}/stop", post(jobs::stop_job))
        .route("/estimate", post(jobs::estimate))
        .route("/bulk-jobs/{id}/documents", get(documents::list_documents))
        .route(
            "/bulk-jobs/{id}/documents/{doc}/retry",
            post(documents::retry_document),
        )
        .route("/bulk-jobs/{id}/export/csv", get(export::export_csv))
        .route("/bulk-jobs/{id}/export/excel", get(export::export_excel))
        .route("/bulk-jobs/{id}/export/preview", get(export::export_preview))
        .route("/review-queue", get(review_queue::list_review_queue))
        .route("/review-queue/{id}", get(review_queue::get_review_item))
        .route("/review-queue/{id}/retry", post(review_queue::retry_review_item))
        .route("/review-queue/{id}/resolve", post(review_queue::resolve_review_item))
        .route("/templates", post(templates::create_template).get(templates::list_templates))
        .route(
            "/templates/{id}",
            get(templates::get_template).delete(templates::delete_template),
        )
        .route("/templates/apply/{job_id}", post(templates::apply_template))
        .route("/templates/export/{job_id}", post(templates::export_template))
        .route("/upload-files", post(upload::upload_files))
        .route("/create-job-with-files", post(upload::create_job_with_files))
        .route("/ws/bulk-jobs/{id}", get(ws::job_events))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

//! HTTP interface (component boundary for the dashboard/UI collaborator):
//! job CRUD and lifecycle control, document/review-queue listing, template
//! management, file upload, and a per-job WebSocket event stream.
//!
//! Grounded on the teacher's own `AppState`/`create_router`/`serve` shape in
//! this same module (see `routes.rs`'s history) — generalized from the FOIA
//! browse UI's repositories to this crate's job/document/review-queue/
//! template repositories.

pub mod api;
pub mod routes;

use std::sync::Arc;

use crate::broker::TaskQueue;
use crate::config::{BrokerConfig, Settings};
use crate::error::Result;
use crate::events::{EventBus, InProcessEventBus, RedisEventBus};
use crate::lifecycle::LifecycleManager;
use crate::repository::pool::DbPool;
use crate::repository::{DocumentRepository, FieldRepository, JobRepository, ReviewQueueRepository, TemplateRepository, TranscriptRepository};
use crate::storage::{LocalFsStorage, StorageGateway};

pub use routes::create_router;

/// Shared state for every handler: one repository per aggregate, the
/// storage gateway, the task queue workers enqueue onto, the lifecycle
/// manager that enforces legal transitions, and the event bus WebSocket
/// clients subscribe to.
#[derive(Clone)]
pub struct AppState {
    pub jobs: JobRepository,
    pub documents: DocumentRepository,
    pub fields: FieldRepository,
    pub review_queue: ReviewQueueRepository,
    pub templates: TemplateRepository,
    pub transcripts: TranscriptRepository,
    pub storage: Arc<dyn StorageGateway>,
    pub queue: TaskQueue,
    pub lifecycle: Arc<LifecycleManager>,
    pub events: Arc<dyn EventBus>,
    pub broker_config: BrokerConfig,
}

impl AppState {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let pool = DbPool::from_url(&settings.database_url)?;
        let jobs = JobRepository::new(pool.clone());
        let documents = DocumentRepository::new(pool.clone());
        let fields = FieldRepository::new(pool.clone());
        let review_queue = ReviewQueueRepository::new(pool.clone());
        let templates = TemplateRepository::new(pool.clone());
        let transcripts = TranscriptRepository::new(pool.clone());
        let storage: Arc<dyn StorageGateway> = Arc::new(LocalFsStorage::new(settings.storage_root.clone()));
        let queue = TaskQueue::new(pool);
        let events: Arc<dyn EventBus> = match &settings.event_bus_url {
            Some(url) => Arc::new(RedisEventBus::new(url)?),
            None => Arc::new(InProcessEventBus::new(256)),
        };
        let lifecycle = Arc::new(LifecycleManager::new(
            jobs.clone(),
            documents.clone(),
            review_queue.clone(),
            events.clone(),
        ));
        Ok(Self {
            jobs,
            documents,
            fields,
            review_queue,
            templates,
            transcripts,
            storage,
            queue,
            lifecycle,
            events,
            broker_config: settings.broker.clone(),
        })
    }
}

/// Bind and serve the HTTP API until the process is signalled to stop.
pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    let state = AppState::new(&settings)?;
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!(addr = %settings.bind_addr, "bulkextract listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Cascade-delete a job and everything that belongs to it (§8 invariant 5:
/// no orphan remains). Shared by the `DELETE /bulk-jobs/{id}` handler and
/// available to tests; lives here rather than in `lifecycle` because it
/// spans repositories `LifecycleManager` doesn't hold a handle to.
pub async fn delete_job_cascade(state: &AppState, job_id: &str) -> Result<()> {
    let documents = state.documents.list_by_job(job_id).await?;
    let document_ids: Vec<String> = documents.iter().map(|d| d.id.clone()).collect();
    state.transcripts.delete_for_documents(&document_ids).await?;
    state.fields.delete_by_job(job_id).await?;
    state.review_queue.delete_by_job(job_id).await?;
    state.documents.delete_by_job(job_id).await?;
    state.jobs.delete(job_id).await?;
    Ok(())
}

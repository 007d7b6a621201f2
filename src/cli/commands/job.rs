//! Job management subcommands: a thin CLI front end over the same
//! repository/lifecycle calls the HTTP handlers make, for operators who
//! want to drive a job without the dashboard.

use std::sync::Arc;

use clap::Subcommand;
use console::style;
use serde_json::json;

use crate::broker::{Task, TaskQueue};
use crate::config::Settings;
use crate::events::InProcessEventBus;
use crate::lifecycle::LifecycleManager;
use crate::models::{Job, JobStatus, SourceKind};
use crate::repository::pool::DbPool;
use crate::repository::{DocumentRepository, JobRepository, ReviewQueueRepository};
use crate::storage::{LocalFsStorage, SourceConfig, StorageGateway};

#[derive(Subcommand)]
pub enum JobCommand {
    /// Create a job from an upload session
    Create {
        session_id: String,
        #[arg(long)]
        document_type: Option<String>,
        #[arg(long)]
        template_id: Option<String>,
    },
    /// Create a job reading straight from a local folder of PDFs
    CreateFolder {
        path: String,
        #[arg(long)]
        document_type: Option<String>,
        #[arg(long)]
        template_id: Option<String>,
    },
    /// List jobs
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show one job
    Get { job_id: String },
    /// Start a job (enqueues discovery)
    Start { job_id: String },
    /// Pause a running job
    Pause { job_id: String },
    /// Resume a paused job
    Resume { job_id: String },
    /// Stop a job
    Stop { job_id: String },
}

pub async fn dispatch(settings: &Settings, action: JobCommand) -> anyhow::Result<()> {
    let pool = DbPool::from_url(&settings.database_url)?;
    let jobs = JobRepository::new(pool.clone());
    let documents = DocumentRepository::new(pool.clone());
    let review_queue = ReviewQueueRepository::new(pool.clone());
    // A CLI invocation is a one-shot process, so a fire-and-forget
    // in-process bus is all `LifecycleManager` needs here: nothing outlives
    // the command to subscribe to its events.
    let events = Arc::new(InProcessEventBus::new(1));
    let lifecycle = LifecycleManager::new(jobs.clone(), documents, review_queue, events);
    let queue = TaskQueue::new(pool);
    let storage = LocalFsStorage::new(settings.storage_root.clone());

    match action {
        JobCommand::Create { session_id, document_type, template_id } => {
            let mut job = Job::new(SourceKind::UploadSession, session_id, document_type);
            job.template_id = template_id;
            jobs.create(&job).await?;
            println!("{} created job {}", style("\u{2713}").green(), job.id);
        }
        JobCommand::CreateFolder { path, document_type, template_id } => {
            storage.validate(&SourceConfig::Folder { path: path.clone(), file_types: vec!["pdf".to_string()] }).await?;
            let mut job = Job::new(SourceKind::Folder, path, document_type);
            job.template_id = template_id;
            jobs.create(&job).await?;
            println!("{} created job {}", style("\u{2713}").green(), job.id);
        }
        JobCommand::List { status, limit } => {
            let status_filter = status.as_deref().and_then(JobStatus::from_str);
            let rows = jobs.list(status_filter, limit).await?;
            for job in rows {
                println!(
                    "{:<36}  {:<12}  {}/{} processed",
                    job.id,
                    job.status.as_str(),
                    job.processed_documents,
                    job.total_documents
                );
            }
        }
        JobCommand::Get { job_id } => {
            let job = jobs.get(&job_id).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        JobCommand::Start { job_id } => {
            let job = jobs.get(&job_id).await?;
            lifecycle.start(&job).await?;
            let task = Task::new(
                "discover_job",
                &json!({ "job_id": job_id }),
                job.priority,
                settings.broker.max_attempts as i32,
            );
            queue.enqueue(&task).await?;
            println!("{} started job {}", style("\u{2713}").green(), job_id);
        }
        JobCommand::Pause { job_id } => {
            let job = jobs.get(&job_id).await?;
            lifecycle.pause(&job).await?;
            println!("{} paused job {}", style("\u{2713}").green(), job_id);
        }
        JobCommand::Resume { job_id } => {
            let job = jobs.get(&job_id).await?;
            lifecycle.resume(&job).await?;
            println!("{} resumed job {}", style("\u{2713}").green(), job_id);
        }
        JobCommand::Stop { job_id } => {
            let job = jobs.get(&job_id).await?;
            lifecycle.stop(&job).await?;
            println!("{} stopping job {}", style("\u{2713}").green(), job_id);
        }
    }

    Ok(())
}

//! End-to-end coverage of the job/document lifecycle against a real
//! (file-backed, hermetic) SQLite database: discovery hand-off, document
//! completion cascading a job to `completed`, the empty-source edge case,
//! retry eligibility, and the durable task queue's claim/complete cycle.

use std::sync::Arc;

use bulkextract::broker::{Task, TaskQueue, TaskStatus};
use bulkextract::events::InProcessEventBus;
use bulkextract::lifecycle::LifecycleManager;
use bulkextract::models::{Document, DocumentStatus, Job, JobStatus, SourceKind};
use bulkextract::repository::migrations::run_migrations;
use bulkextract::repository::pool::DbPool;
use bulkextract::repository::{DocumentRepository, JobRepository, ReviewQueueRepository};

/// A fresh, migrated SQLite database backed by a tempdir file. `:memory:`
/// can't be used here: `SqlitePool::get` establishes a brand new connection
/// per call, and each `:memory:` connection is its own independent,
/// unmigrated database.
async fn test_db() -> (tempfile::TempDir, DbPool) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.sqlite");
    let url = format!("sqlite:{}", path.display());
    run_migrations(&url).await.unwrap();
    let pool = DbPool::from_url(&url).unwrap();
    (dir, pool)
}

fn lifecycle(pool: &DbPool) -> (LifecycleManager, JobRepository, DocumentRepository) {
    let jobs = JobRepository::new(pool.clone());
    let documents = DocumentRepository::new(pool.clone());
    let review_queue = ReviewQueueRepository::new(pool.clone());
    let events = Arc::new(InProcessEventBus::new(16));
    let manager = LifecycleManager::new(jobs.clone(), documents.clone(), review_queue, events);
    (manager, jobs, documents)
}

#[tokio::test]
async fn happy_path_completes_once_every_document_is_terminal() {
    let (_dir, pool) = test_db().await;
    let (manager, jobs, documents) = lifecycle(&pool);

    let job = Job::new(SourceKind::UploadSession, "session-1".to_string(), Some("bank_statement".to_string()));
    jobs.create(&job).await.unwrap();
    manager.start(&job).await.unwrap();

    let doc_a = Document::new(job.id.clone(), "a.pdf".into(), "objects/a.pdf".into(), "application/pdf".into(), None, 3);
    let doc_b = Document::new(job.id.clone(), "b.pdf".into(), "objects/b.pdf".into(), "application/pdf".into(), None, 3);
    documents.create_batch(&[doc_a.clone(), doc_b.clone()]).await.unwrap();

    let job = jobs.get(&job.id).await.unwrap();
    manager.mark_discovered(&job, 2).await.unwrap();
    let job = jobs.get(&job.id).await.unwrap();
    assert_eq!(job.status(), JobStatus::Running);

    documents.set_status(&doc_a.id, DocumentStatus::Completed).await.unwrap();
    assert!(!manager.maybe_complete_job(&job).await.unwrap());

    documents.set_status(&doc_b.id, DocumentStatus::Completed).await.unwrap();
    assert!(manager.maybe_complete_job(&job).await.unwrap());

    let job = jobs.get(&job.id).await.unwrap();
    assert_eq!(job.status(), JobStatus::Completed);
}

#[tokio::test]
async fn empty_source_completes_immediately() {
    let (_dir, pool) = test_db().await;
    let (manager, jobs, _documents) = lifecycle(&pool);

    let job = Job::new(SourceKind::UploadSession, "session-empty".to_string(), None);
    jobs.create(&job).await.unwrap();
    manager.start(&job).await.unwrap();
    let job = jobs.get(&job.id).await.unwrap();

    manager.mark_discovered(&job, 0).await.unwrap();
    let job = jobs.get(&job.id).await.unwrap();
    assert_eq!(job.status(), JobStatus::Running);

    assert!(manager.maybe_complete_job(&job).await.unwrap());
    let job = jobs.get(&job.id).await.unwrap();
    assert_eq!(job.status(), JobStatus::Completed);
}

#[tokio::test]
async fn needs_review_documents_are_flagged_before_job_completion() {
    let (_dir, pool) = test_db().await;
    let (manager, jobs, documents) = lifecycle(&pool);

    let job = Job::new(SourceKind::UploadSession, "session-review".to_string(), None);
    jobs.create(&job).await.unwrap();
    manager.start(&job).await.unwrap();
    let doc = Document::new(job.id.clone(), "c.pdf".into(), "objects/c.pdf".into(), "application/pdf".into(), None, 3);
    documents.create(&doc).await.unwrap();

    let job = jobs.get(&job.id).await.unwrap();
    manager.mark_discovered(&job, 1).await.unwrap();
    let job = jobs.get(&job.id).await.unwrap();

    documents.set_status(&doc.id, DocumentStatus::NeedsReview).await.unwrap();
    assert!(manager.maybe_complete_job(&job).await.unwrap());

    let job = jobs.get(&job.id).await.unwrap();
    assert_eq!(job.status(), JobStatus::Completed);
}

#[tokio::test]
async fn retry_rejects_a_document_that_has_exhausted_its_attempts() {
    let (_dir, pool) = test_db().await;
    let (manager, jobs, documents) = lifecycle(&pool);

    let job = Job::new(SourceKind::UploadSession, "session-retry".to_string(), None);
    jobs.create(&job).await.unwrap();

    let mut doc = Document::new(job.id.clone(), "d.pdf".into(), "objects/d.pdf".into(), "application/pdf".into(), None, 1);
    doc.retry_count = 1;
    documents.create(&doc).await.unwrap();
    documents.set_status(&doc.id, DocumentStatus::Failed).await.unwrap();

    let result = manager.retry_document(&job.id, &doc.id).await;
    assert!(result.is_err(), "a document that has used its only retry must not be retried again");
}

#[tokio::test]
async fn task_queue_claim_and_complete_round_trip() {
    let (_dir, pool) = test_db().await;
    let queue = TaskQueue::new(pool);

    let task = Task::new("discover_job", &serde_json::json!({"job_id": "job-1"}), 0, 5);
    queue.enqueue(&task).await.unwrap();

    let claimed = queue.claim_next("worker-a").await.unwrap().expect("task should be claimable");
    assert_eq!(claimed.task_type, "discover_job");
    assert_eq!(claimed.status, TaskStatus::Running.as_str());

    assert!(queue.claim_next("worker-b").await.unwrap().is_none(), "a running task must not be double-claimed");

    queue.complete(&claimed.id).await.unwrap();
    let requeued = queue.claim_next("worker-a").await.unwrap();
    assert!(requeued.is_none(), "a completed task must not resurface");
}

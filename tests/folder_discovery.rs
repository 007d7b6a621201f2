//! End-to-end coverage of discovery against a real local-folder source
//! (spec §8 scenario 1: a job pointed at a folder of PDFs), exercising the
//! Storage Gateway's `enumerate`/`fetch` contract rather than the upload
//! session manifest path `tests/job_lifecycle.rs` covers.

use std::sync::Arc;

use bulkextract::broker::TaskQueue;
use bulkextract::discovery::{DiscoveryMode, DiscoveryWorker};
use bulkextract::events::InProcessEventBus;
use bulkextract::lifecycle::LifecycleManager;
use bulkextract::models::{Job, JobStatus, SourceKind};
use bulkextract::repository::migrations::run_migrations;
use bulkextract::repository::pool::DbPool;
use bulkextract::repository::{DocumentRepository, JobRepository, ReviewQueueRepository};
use bulkextract::storage::{LocalFsStorage, StorageGateway};

async fn test_db() -> (tempfile::TempDir, DbPool) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.sqlite");
    let url = format!("sqlite:{}", path.display());
    run_migrations(&url).await.unwrap();
    let pool = DbPool::from_url(&url).unwrap();
    (dir, pool)
}

#[tokio::test]
async fn folder_source_discovers_one_document_per_pdf() {
    let (_db_dir, pool) = test_db().await;
    let source_dir = tempfile::tempdir().unwrap();
    std::fs::write(source_dir.path().join("a.pdf"), b"a-bytes").unwrap();
    std::fs::write(source_dir.path().join("b.pdf"), b"b-bytes").unwrap();
    std::fs::write(source_dir.path().join("readme.txt"), b"not a document").unwrap();

    let jobs = JobRepository::new(pool.clone());
    let documents = DocumentRepository::new(pool.clone());
    let review_queue = ReviewQueueRepository::new(pool.clone());
    let events = Arc::new(InProcessEventBus::new(16));
    let lifecycle = Arc::new(LifecycleManager::new(jobs.clone(), documents.clone(), review_queue, events));
    let storage: Arc<dyn StorageGateway> = Arc::new(LocalFsStorage::new(tempfile::tempdir().unwrap().path()));
    let queue = TaskQueue::new(pool.clone());

    let job = Job::new(SourceKind::Folder, source_dir.path().to_string_lossy().into_owned(), Some("generic".to_string()));
    jobs.create(&job).await.unwrap();
    lifecycle.start(&job).await.unwrap();

    let worker = DiscoveryWorker::new(jobs.clone(), documents.clone(), storage, queue.clone(), lifecycle, 3);
    let created = worker.discover(&job.id, DiscoveryMode::Manifest).await.unwrap();
    assert_eq!(created, 2, "the .txt file must not be discovered as a document");

    let job = jobs.get(&job.id).await.unwrap();
    assert_eq!(job.total_documents, 2);
    assert_eq!(job.status(), JobStatus::Running);

    let docs = documents.list_by_job(&job.id).await.unwrap();
    let mut names: Vec<&str> = docs.iter().map(|d| d.original_filename.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["a.pdf", "b.pdf"]);

    assert!(queue.claim_next("worker-a").await.unwrap().is_some());
    assert!(queue.claim_next("worker-a").await.unwrap().is_some());
}

#[tokio::test]
async fn rediscovering_a_folder_source_does_not_duplicate_documents() {
    let (_db_dir, pool) = test_db().await;
    let source_dir = tempfile::tempdir().unwrap();
    std::fs::write(source_dir.path().join("a.pdf"), b"a-bytes").unwrap();

    let jobs = JobRepository::new(pool.clone());
    let documents = DocumentRepository::new(pool.clone());
    let review_queue = ReviewQueueRepository::new(pool.clone());
    let events = Arc::new(InProcessEventBus::new(16));
    let lifecycle = Arc::new(LifecycleManager::new(jobs.clone(), documents.clone(), review_queue, events));
    let storage: Arc<dyn StorageGateway> = Arc::new(LocalFsStorage::new(tempfile::tempdir().unwrap().path()));
    let queue = TaskQueue::new(pool.clone());

    let job = Job::new(SourceKind::Folder, source_dir.path().to_string_lossy().into_owned(), None);
    jobs.create(&job).await.unwrap();
    lifecycle.start(&job).await.unwrap();

    let worker = DiscoveryWorker::new(jobs.clone(), documents.clone(), storage, queue, lifecycle, 3);
    assert_eq!(worker.discover(&job.id, DiscoveryMode::Manifest).await.unwrap(), 1);
    assert_eq!(worker.discover(&job.id, DiscoveryMode::Manifest).await.unwrap(), 0, "already-known files must be skipped");

    let job = jobs.get(&job.id).await.unwrap();
    assert_eq!(job.total_documents, 1);
}

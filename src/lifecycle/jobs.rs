//! Legal transition enforcement for jobs and documents, plus the per-job
//! completion cascade (§4.G).
//!
//! Grounded on `repository/crawl/state.rs`'s pattern of a thin manager
//! layer sitting on top of plain CRUD repositories, here generalized from
//! crawl-source status bookkeeping to job/document status bookkeeping.

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::events::{EventBus, JobEvent};
use crate::models::{DocumentStatus, Job, JobStatus, ReviewQueueItem};
use crate::repository::{DocumentRepository, JobRepository, ReviewQueueRepository};

/// `true` if a job may move from `from` to `to` directly.
fn is_legal_job_transition(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::*;
    matches!(
        (from, to),
        (Pending, Discovering)
            | (Discovering, Running)
            | (Discovering, Failed)
            | (Running, Paused)
            | (Paused, Running)
            | (Running, Stopping)
            | (Paused, Stopping)
            | (Running, Completed)
            | (Paused, Completed)
            | (Stopping, Completed)
            | (Stopping, Failed)
    )
}

/// `true` if a document may move from `from` to `to` directly.
fn is_legal_document_transition(from: DocumentStatus, to: DocumentStatus) -> bool {
    use DocumentStatus::*;
    matches!(
        (from, to),
        (Pending, Queued)
            | (Queued, Processing)
            | (Processing, Completed)
            | (Processing, Failed)
            | (Processing, NeedsReview)
            | (Processing, Queued) // reconciler stall revert
            | (Failed, Queued)
            | (NeedsReview, Queued)
    )
}

/// Enforces job/document transitions and cascades job completion once a
/// job's documents have all reached a terminal state.
pub struct LifecycleManager {
    jobs: JobRepository,
    documents: DocumentRepository,
    review_queue: ReviewQueueRepository,
    events: Arc<dyn EventBus>,
}

impl LifecycleManager {
    pub fn new(
        jobs: JobRepository,
        documents: DocumentRepository,
        review_queue: ReviewQueueRepository,
        events: Arc<dyn EventBus>,
    ) -> Self {
        Self { jobs, documents, review_queue, events }
    }

    /// Move a job to `to`, rejecting the call if the transition isn't legal
    /// from its current status.
    pub async fn transition_job(&self, job: &Job, to: JobStatus) -> Result<()> {
        if !is_legal_job_transition(job.status(), to) {
            return Err(AppError::IllegalTransition(format!(
                "job cannot move from {} to {}",
                job.status().as_str(),
                to.as_str()
            )));
        }
        self.jobs.set_status(&job.id, to).await
    }

    pub async fn start(&self, job: &Job) -> Result<()> {
        self.transition_job(job, JobStatus::Discovering).await
    }

    /// Discovery finished: record the document count and move into `running`.
    pub async fn mark_discovered(&self, job: &Job, total_documents: i32) -> Result<()> {
        self.transition_job(job, JobStatus::Running).await?;
        self.jobs.set_total_documents(&job.id, total_documents).await
    }

    pub async fn mark_discovery_failed(&self, job: &Job, message: &str) -> Result<()> {
        self.transition_job(job, JobStatus::Failed).await?;
        self.jobs.set_error(&job.id, message).await
    }

    pub async fn pause(&self, job: &Job) -> Result<()> {
        self.transition_job(job, JobStatus::Paused).await
    }

    pub async fn resume(&self, job: &Job) -> Result<()> {
        self.transition_job(job, JobStatus::Running).await
    }

    pub async fn stop(&self, job: &Job) -> Result<()> {
        self.transition_job(job, JobStatus::Stopping).await
    }

    /// Move a document to `to`, rejecting the call if the transition isn't
    /// legal from its current status.
    pub async fn transition_document(&self, document_id: &str, from: DocumentStatus, to: DocumentStatus) -> Result<()> {
        if !is_legal_document_transition(from, to) {
            return Err(AppError::IllegalTransition(format!(
                "document cannot move from {} to {}",
                from.as_str(),
                to.as_str()
            )));
        }
        self.documents.set_status(document_id, to).await
    }

    /// Requeue a terminal, retryable document. Rejects an exhausted or
    /// non-terminal document with `IllegalTransition`.
    pub async fn retry_document(&self, job_id: &str, document_id: &str) -> Result<()> {
        let document = self.documents.get(document_id).await?;
        if !document.can_retry() {
            return Err(AppError::IllegalTransition(format!(
                "document {document_id} is not eligible for retry (status {}, {}/{} attempts)",
                document.status().as_str(),
                document.retry_count,
                document.max_retries
            )));
        }
        self.documents.retry(document_id).await?;
        let _ = self
            .events
            .publish(JobEvent::DocumentStarted { job_id: job_id.to_string(), document_id: document_id.to_string() })
            .await;
        Ok(())
    }

    /// Check whether every document under `job` has reached a terminal
    /// state and, if so, cascade the job itself to `completed`. Returns
    /// whether the cascade fired.
    pub async fn maybe_complete_job(&self, job: &Job) -> Result<bool> {
        if job.status().is_terminal() {
            return Ok(false);
        }
        // Before discovery has recorded `total_documents`, an empty document
        // table means "not discovered yet", not "empty source" — only treat
        // a zero count as completion once the job itself agrees there are
        // zero documents to process.
        if !matches!(job.status(), JobStatus::Running | JobStatus::Paused | JobStatus::Stopping) {
            return Ok(false);
        }
        let (total, completed, failed, needs_review) = self.documents.status_tally(&job.id).await?;
        if total == 0 {
            if job.total_documents == 0 {
                self.transition_job(job, JobStatus::Completed).await?;
                return Ok(true);
            }
            return Ok(false);
        }
        if completed + failed + needs_review != total {
            return Ok(false);
        }
        self.backfill_needs_review(job).await?;
        self.transition_job(job, JobStatus::Completed).await?;
        Ok(true)
    }

    /// Raise a review-queue flag for every `needs_review` document under
    /// `job` that doesn't already have one (§4.G's "needs-review backfill").
    pub async fn backfill_needs_review(&self, job: &Job) -> Result<usize> {
        let documents = self.documents.list_by_job(&job.id).await?;
        let flagged = self.review_queue.list_unresolved_for_job(&job.id).await?;
        let mut created = 0;
        for document in documents.iter().filter(|d| d.status() == DocumentStatus::NeedsReview) {
            let already_flagged = flagged.iter().any(|item| item.document_id == document.id);
            if already_flagged {
                continue;
            }
            let item = ReviewQueueItem::new(
                job.id.clone(),
                document.id.clone(),
                None,
                "document completed below the confidence threshold".to_string(),
                document.error.clone(),
                document.error_type.clone(),
                job.priority,
            );
            self.review_queue.create(&item).await?;
            created += 1;
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_may_only_move_to_discovering() {
        assert!(is_legal_job_transition(JobStatus::Pending, JobStatus::Discovering));
        assert!(!is_legal_job_transition(JobStatus::Pending, JobStatus::Running));
    }

    #[test]
    fn running_can_pause_and_stop_but_not_jump_to_discovering() {
        assert!(is_legal_job_transition(JobStatus::Running, JobStatus::Paused));
        assert!(is_legal_job_transition(JobStatus::Running, JobStatus::Stopping));
        assert!(!is_legal_job_transition(JobStatus::Running, JobStatus::Discovering));
    }

    #[test]
    fn document_retry_only_from_terminal_failure_states() {
        assert!(is_legal_document_transition(DocumentStatus::Failed, DocumentStatus::Queued));
        assert!(is_legal_document_transition(DocumentStatus::NeedsReview, DocumentStatus::Queued));
        assert!(!is_legal_document_transition(DocumentStatus::Completed, DocumentStatus::Queued));
    }

    #[test]
    fn processing_can_revert_to_queued_for_stall_recovery() {
        assert!(is_legal_document_transition(DocumentStatus::Processing, DocumentStatus::Queued));
    }
}

//! Reconciler: on-demand and fixed-cadence sweep that recovers stuck jobs
//! and documents, and surfaces completed jobs whose cascade was never
//! triggered by an in-process worker (e.g. the worker that would have
//! triggered it crashed first).
//!
//! Grounded on `repository/crawl/state.rs`'s stalled-crawl sweep, here
//! generalized to jobs and documents instead of crawl sources.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::Result;
use crate::lifecycle::jobs::LifecycleManager;
use crate::models::{DocumentStatus, JobStatus};
use crate::repository::{DocumentRepository, JobRepository};

/// One reconciliation pass's outcome, mostly useful for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub documents_requeued: usize,
    pub jobs_completed: usize,
}

pub struct Reconciler {
    jobs: JobRepository,
    documents: DocumentRepository,
    lifecycle: Arc<LifecycleManager>,
    stall_threshold_secs: i64,
}

impl Reconciler {
    pub fn new(
        jobs: JobRepository,
        documents: DocumentRepository,
        lifecycle: Arc<LifecycleManager>,
        stall_threshold_secs: i64,
    ) -> Self {
        Self { jobs, documents, lifecycle, stall_threshold_secs }
    }

    /// Run one reconciliation pass: revert stalled documents to `queued`,
    /// then check every `running` job for a completion cascade that never
    /// fired.
    pub async fn reconcile_once(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let stalled = self.documents.find_stalled(self.stall_threshold_secs).await?;
        for document in &stalled {
            self.lifecycle
                .transition_document(&document.id, DocumentStatus::Processing, DocumentStatus::Queued)
                .await?;
            warn!(document_id = %document.id, job_id = %document.job_id, "reconciler requeued stalled document");
            report.documents_requeued += 1;
        }

        let running = self.jobs.list(Some(JobStatus::Running), i64::MAX).await?;
        for job in &running {
            if self.lifecycle.maybe_complete_job(job).await? {
                info!(job_id = %job.id, "reconciler cascaded job to completed");
                report.jobs_completed += 1;
            }
        }

        Ok(report)
    }

    /// Run `reconcile_once` on a fixed cadence until the process exits.
    /// Errors from a single pass are logged and swallowed so one bad sweep
    /// doesn't kill the loop.
    pub async fn run_forever(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match self.reconcile_once().await {
                Ok(report) if report.documents_requeued > 0 || report.jobs_completed > 0 => {
                    info!(
                        documents_requeued = report.documents_requeued,
                        jobs_completed = report.jobs_completed,
                        "reconciler pass recovered work"
                    );
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "reconciler pass failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_report_is_empty() {
        let report = ReconcileReport::default();
        assert_eq!(report.documents_requeued, 0);
        assert_eq!(report.jobs_completed, 0);
    }
}

//! Document repository: CRUD plus the per-job status tallies the lifecycle
//! manager uses to decide when a job is complete, grounded on the same
//! counting-query style as `jobs.rs` (there per-job; here per-document).

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::error::{AppError, Result};
use crate::models::{Document, DocumentStatus, ProcessingStage};
use crate::repository::pool::DbPool;
use crate::schema::documents::dsl::*;
use crate::with_conn;

#[derive(Clone)]
pub struct DocumentRepository {
    pool: DbPool,
}

impl DocumentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, doc: &Document) -> Result<()> {
        with_conn!(self.pool, conn => {
            diesel::insert_into(documents)
                .values(doc)
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    pub async fn create_batch(&self, docs: &[Document]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        with_conn!(self.pool, conn => {
            diesel::insert_into(documents)
                .values(docs)
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    pub async fn get(&self, document_id: &str) -> Result<Document> {
        let found: Option<Document> = with_conn!(self.pool, conn => {
            documents.filter(id.eq(document_id))
                .first(&mut conn)
                .await
                .optional()
        })?;
        found.ok_or_else(|| AppError::NotFound(format!("document {document_id}")))
    }

    pub async fn list_by_job(&self, for_job: &str) -> Result<Vec<Document>> {
        let rows: Vec<Document> = with_conn!(self.pool, conn => {
            documents.filter(job_id.eq(for_job))
                .order(created_at.asc())
                .load(&mut conn)
                .await
        })?;
        Ok(rows)
    }

    /// Optimistic claim: only succeeds if the document is still `queued`
    /// (§5's "enforced by an optimistic `WHERE status='queued'`"). Returns
    /// `false` if another worker already claimed it.
    pub async fn claim_for_processing(&self, document_id: &str, worker: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let affected = with_conn!(self.pool, conn => {
            diesel::update(
                documents
                    .filter(id.eq(document_id))
                    .filter(status.eq(DocumentStatus::Queued.as_str())),
            )
            .set((
                status.eq(DocumentStatus::Processing.as_str()),
                worker_id.eq(worker),
                processing_started_at.eq(&now),
                updated_at.eq(&now),
            ))
            .execute(&mut conn)
            .await
        })?;
        Ok(affected > 0)
    }

    pub async fn set_status(&self, document_id: &str, new_status: DocumentStatus) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        with_conn!(self.pool, conn => {
            diesel::update(documents.filter(id.eq(document_id)))
                .set((status.eq(new_status.as_str()), updated_at.eq(now)))
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    pub async fn set_stage(&self, document_id: &str, stage: ProcessingStage) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        with_conn!(self.pool, conn => {
            diesel::update(documents.filter(id.eq(document_id)))
                .set((processing_stage.eq(stage.as_str()), updated_at.eq(now)))
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    pub async fn set_page_count(&self, document_id: &str, count: i32) -> Result<()> {
        with_conn!(self.pool, conn => {
            diesel::update(documents.filter(id.eq(document_id)))
                .set(page_count.eq(count))
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    pub async fn increment_pages_processed(&self, document_id: &str, by: i32) -> Result<()> {
        with_conn!(self.pool, conn => {
            diesel::update(documents.filter(id.eq(document_id)))
                .set(pages_processed.eq(pages_processed + by))
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    /// Record per-document telemetry and terminal status in one update, the
    /// same atomic write the extraction worker's step 11-13 describes
    /// (telemetry + terminal transition committed together).
    #[allow(clippy::too_many_arguments)]
    pub async fn complete_with_telemetry(
        &self,
        document_id: &str,
        final_status: DocumentStatus,
        total_fields: i32,
        fields_review: i32,
        avg_confidence: Option<f64>,
        extraction_ms: i64,
        usage_json: Option<String>,
        cost_estimate: Option<f64>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        with_conn!(self.pool, conn => {
            diesel::update(documents.filter(id.eq(document_id)))
                .set((
                    status.eq(final_status.as_str()),
                    total_fields_extracted.eq(total_fields),
                    fields_needing_review.eq(fields_review),
                    average_confidence.eq(avg_confidence),
                    extraction_time_ms.eq(extraction_ms),
                    token_usage_json.eq(usage_json),
                    cost.eq(cost_estimate),
                    worker_id.eq(None::<String>),
                    updated_at.eq(now),
                ))
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    pub async fn set_error(&self, document_id: &str, message: &str, kind: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        with_conn!(self.pool, conn => {
            diesel::update(documents.filter(id.eq(document_id)))
                .set((
                    error.eq(message),
                    error_type.eq(kind),
                    status.eq(DocumentStatus::Failed.as_str()),
                    worker_id.eq(None::<String>),
                    updated_at.eq(now),
                ))
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    /// Requeue a terminal, retryable document (`{failed,needs_review} ->
    /// queued` with `retry_count + 1`, per §4.G).
    pub async fn retry(&self, document_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        with_conn!(self.pool, conn => {
            diesel::update(documents.filter(id.eq(document_id)))
                .set((
                    status.eq(DocumentStatus::Queued.as_str()),
                    retry_count.eq(retry_count + 1),
                    error.eq(None::<String>),
                    error_type.eq(None::<String>),
                    updated_at.eq(now),
                ))
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    /// Documents stuck `processing` since before `cutoff` — the
    /// reconciler's stall detector (§4.G).
    pub async fn find_stalled(&self, stall_threshold_secs: i64) -> Result<Vec<Document>> {
        let cutoff = (Utc::now() - chrono::Duration::seconds(stall_threshold_secs)).to_rfc3339();
        let rows: Vec<Document> = with_conn!(self.pool, conn => {
            documents
                .filter(status.eq(DocumentStatus::Processing.as_str()))
                .filter(processing_started_at.lt(cutoff))
                .load(&mut conn)
                .await
        })?;
        Ok(rows)
    }

    /// `(total, completed, failed, needs_review)` for a job, used to decide
    /// whether the job as a whole has finished.
    pub async fn status_tally(&self, for_job: &str) -> Result<(i64, i64, i64, i64)> {
        let rows: Vec<Document> = self.list_by_job(for_job).await?;
        let total = rows.len() as i64;
        let completed = rows.iter().filter(|d| d.status() == DocumentStatus::Completed).count() as i64;
        let failed = rows.iter().filter(|d| d.status() == DocumentStatus::Failed).count() as i64;
        let needs_review = rows.iter().filter(|d| d.status() == DocumentStatus::NeedsReview).count() as i64;
        Ok((total, completed, failed, needs_review))
    }

    /// A page of a job's documents, optionally narrowed to one status, for
    /// the document-listing endpoint.
    pub async fn list_by_job_page(
        &self,
        for_job: &str,
        status_filter: Option<DocumentStatus>,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Document>> {
        let rows: Vec<Document> = with_conn!(self.pool, conn => {
            match status_filter {
                Some(s) => {
                    documents.filter(job_id.eq(for_job))
                        .filter(status.eq(s.as_str()))
                        .order(created_at.asc())
                        .offset(skip)
                        .limit(limit)
                        .load(&mut conn)
                        .await
                }
                None => {
                    documents.filter(job_id.eq(for_job))
                        .order(created_at.asc())
                        .offset(skip)
                        .limit(limit)
                        .load(&mut conn)
                        .await
                }
            }
        })?;
        Ok(rows)
    }

    pub async fn count_by_job(&self, for_job: &str, status_filter: Option<DocumentStatus>) -> Result<i64> {
        let total: i64 = with_conn!(self.pool, conn => {
            match status_filter {
                Some(s) => {
                    documents.filter(job_id.eq(for_job))
                        .filter(status.eq(s.as_str()))
                        .count()
                        .get_result(&mut conn)
                        .await
                }
                None => documents.filter(job_id.eq(for_job)).count().get_result(&mut conn).await,
            }
        })?;
        Ok(total)
    }

    /// Delete every document row under `for_job`, part of the job-delete
    /// cascade (§8 invariant 5: no orphan remains).
    pub async fn delete_by_job(&self, for_job: &str) -> Result<()> {
        with_conn!(self.pool, conn => {
            diesel::delete(documents.filter(job_id.eq(for_job))).execute(&mut conn).await
        })?;
        Ok(())
    }
}

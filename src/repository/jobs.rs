//! Job repository: CRUD plus the aggregate status-counting queries the
//! lifecycle manager and reconciler rely on, grounded on the counting-query
//! style of `repository/crawl/state.rs` (there: per-source URL status
//! tallies; here: per-job document status tallies).

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::error::{AppError, Result};
use crate::models::{Job, JobStatus};
use crate::repository::pool::DbPool;
use crate::schema::jobs::dsl::*;
use crate::with_conn;

#[derive(Clone)]
pub struct JobRepository {
    pool: DbPool,
}

impl JobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, job: &Job) -> Result<()> {
        with_conn!(self.pool, conn => {
            diesel::insert_into(jobs)
                .values(job)
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    pub async fn get(&self, job_id: &str) -> Result<Job> {
        let found: Option<Job> = with_conn!(self.pool, conn => {
            jobs.filter(id.eq(job_id))
                .first(&mut conn)
                .await
                .optional()
        })?;
        found.ok_or_else(|| AppError::NotFound(format!("job {job_id}")))
    }

    /// Lists jobs in broker delivery order: priority 1 (highest) before 5
    /// (lowest), per §4.H.
    pub async fn list(&self, status_filter: Option<JobStatus>, limit: i64) -> Result<Vec<Job>> {
        let rows: Vec<Job> = with_conn!(self.pool, conn => {
            match status_filter {
                Some(s) => {
                    jobs.filter(status.eq(s.as_str()))
                        .order(priority.asc())
                        .limit(limit)
                        .load(&mut conn)
                        .await
                }
                None => {
                    jobs.order(priority.asc()).limit(limit).load(&mut conn).await
                }
            }
        })?;
        Ok(rows)
    }

    /// Apply a status transition plus any stage timestamps. The legality of
    /// the transition itself is checked by `crate::lifecycle::jobs` before
    /// this is called; this layer just persists.
    pub async fn set_status(&self, job_id: &str, new_status: JobStatus) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        with_conn!(self.pool, conn => {
            match new_status {
                JobStatus::Running => {
                    diesel::update(jobs.filter(id.eq(job_id)))
                        .set((
                            status.eq(new_status.as_str()),
                            updated_at.eq(now.clone()),
                            started_at.eq(now.clone()),
                        ))
                        .execute(&mut conn)
                        .await
                }
                JobStatus::Paused => {
                    diesel::update(jobs.filter(id.eq(job_id)))
                        .set((
                            status.eq(new_status.as_str()),
                            updated_at.eq(now.clone()),
                            paused_at.eq(now.clone()),
                        ))
                        .execute(&mut conn)
                        .await
                }
                JobStatus::Completed | JobStatus::Failed => {
                    diesel::update(jobs.filter(id.eq(job_id)))
                        .set((
                            status.eq(new_status.as_str()),
                            updated_at.eq(now.clone()),
                            completed_at.eq(now.clone()),
                        ))
                        .execute(&mut conn)
                        .await
                }
                _ => {
                    diesel::update(jobs.filter(id.eq(job_id)))
                        .set((status.eq(new_status.as_str()), updated_at.eq(now.clone())))
                        .execute(&mut conn)
                        .await
                }
            }
        })?;
        Ok(())
    }

    pub async fn set_error(&self, job_id: &str, message: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        with_conn!(self.pool, conn => {
            diesel::update(jobs.filter(id.eq(job_id)))
                .set((error.eq(message), updated_at.eq(now)))
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    pub async fn increment_processed(&self, job_id: &str, document_failed: bool) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        with_conn!(self.pool, conn => {
            if document_failed {
                diesel::update(jobs.filter(id.eq(job_id)))
                    .set((
                        processed_documents.eq(processed_documents + 1),
                        failed_documents.eq(failed_documents + 1),
                        updated_at.eq(now),
                    ))
                    .execute(&mut conn)
                    .await
            } else {
                diesel::update(jobs.filter(id.eq(job_id)))
                    .set((processed_documents.eq(processed_documents + 1), updated_at.eq(now)))
                    .execute(&mut conn)
                    .await
            }
        })?;
        Ok(())
    }

    pub async fn set_total_documents(&self, job_id: &str, total: i32) -> Result<()> {
        with_conn!(self.pool, conn => {
            diesel::update(jobs.filter(id.eq(job_id)))
                .set(total_documents.eq(total))
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    /// Jobs that have been `Running` with no heartbeat-bearing task for
    /// longer than `stuck_after_secs` — candidates for the reconciler.
    pub async fn find_stuck(&self, stuck_after_secs: i64) -> Result<Vec<Job>> {
        let cutoff = (Utc::now() - chrono::Duration::seconds(stuck_after_secs)).to_rfc3339();
        let rows: Vec<Job> = with_conn!(self.pool, conn => {
            jobs.filter(status.eq(JobStatus::Running.as_str()))
                .filter(updated_at.lt(cutoff))
                .load(&mut conn)
                .await
        })?;
        Ok(rows)
    }

    pub async fn set_worker_id(&self, job_id: &str, worker: &str) -> Result<()> {
        with_conn!(self.pool, conn => {
            diesel::update(jobs.filter(id.eq(job_id)))
                .set(worker_id.eq(worker))
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    /// A page of jobs ordered newest-first, for the job-listing endpoint.
    pub async fn list_page(&self, status_filter: Option<JobStatus>, skip: i64, limit: i64) -> Result<Vec<Job>> {
        let rows: Vec<Job> = with_conn!(self.pool, conn => {
            match status_filter {
                Some(s) => {
                    jobs.filter(status.eq(s.as_str()))
                        .order(created_at.desc())
                        .offset(skip)
                        .limit(limit)
                        .load(&mut conn)
                        .await
                }
                None => {
                    jobs.order(created_at.desc())
                        .offset(skip)
                        .limit(limit)
                        .load(&mut conn)
                        .await
                }
            }
        })?;
        Ok(rows)
    }

    pub async fn count(&self, status_filter: Option<JobStatus>) -> Result<i64> {
        let total: i64 = with_conn!(self.pool, conn => {
            match status_filter {
                Some(s) => jobs.filter(status.eq(s.as_str())).count().get_result(&mut conn).await,
                None => jobs.count().get_result(&mut conn).await,
            }
        })?;
        Ok(total)
    }

    /// Update the mutable configuration fields a job may still change
    /// (`PUT /bulk-jobs/{id}`). Callers only pass the fields the request body
    /// actually set; the rest are left untouched. Three independent updates
    /// rather than one dynamic `SET` list, since Diesel's update builder
    /// can't vary its column set at runtime.
    pub async fn update_config(
        &self,
        job_id: &str,
        new_document_type: Option<Option<String>>,
        new_template_id: Option<Option<String>>,
        new_priority: Option<i32>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        if let Some(v) = new_document_type {
            with_conn!(self.pool, conn => {
                diesel::update(jobs.filter(id.eq(job_id)))
                    .set((document_type.eq(v), updated_at.eq(&now)))
                    .execute(&mut conn)
                    .await
            })?;
        }
        if let Some(v) = new_template_id {
            with_conn!(self.pool, conn => {
                diesel::update(jobs.filter(id.eq(job_id)))
                    .set((template_id.eq(v), updated_at.eq(&now)))
                    .execute(&mut conn)
                    .await
            })?;
        }
        if let Some(v) = new_priority {
            with_conn!(self.pool, conn => {
                diesel::update(jobs.filter(id.eq(job_id)))
                    .set((priority.eq(v), updated_at.eq(&now)))
                    .execute(&mut conn)
                    .await
            })?;
        }
        Ok(())
    }

    /// Delete the job row itself. Callers are responsible for cascading to
    /// `documents`/`extracted_fields`/`review_queue_items` first (§8
    /// invariant 5: no orphan remains).
    pub async fn delete(&self, job_id: &str) -> Result<()> {
        let affected = with_conn!(self.pool, conn => {
            diesel::delete(jobs.filter(id.eq(job_id))).execute(&mut conn).await
        })?;
        if affected == 0 {
            return Err(AppError::NotFound(format!("job {job_id}")));
        }
        Ok(())
    }
}

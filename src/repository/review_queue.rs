//! Review-queue repository: raising and resolving human-review flags.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::error::{AppError, Result};
use crate::models::{ReviewQueueItem, ReviewStatus};
use crate::repository::pool::DbPool;
use crate::schema::review_queue_items::dsl::*;
use crate::with_conn;

#[derive(Clone)]
pub struct ReviewQueueRepository {
    pool: DbPool,
}

impl ReviewQueueRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, item: &ReviewQueueItem) -> Result<()> {
        with_conn!(self.pool, conn => {
            diesel::insert_into(review_queue_items)
                .values(item)
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    pub async fn list_unresolved_for_job(&self, for_job: &str) -> Result<Vec<ReviewQueueItem>> {
        let rows: Vec<ReviewQueueItem> = with_conn!(self.pool, conn => {
            review_queue_items
                .filter(job_id.eq(for_job))
                .filter(status.ne(ReviewStatus::Resolved.as_str()))
                .order(created_at.asc())
                .load(&mut conn)
                .await
        })?;
        Ok(rows)
    }

    pub async fn count_unresolved_for_job(&self, for_job: &str) -> Result<i64> {
        let count: i64 = with_conn!(self.pool, conn => {
            review_queue_items
                .filter(job_id.eq(for_job))
                .filter(status.ne(ReviewStatus::Resolved.as_str()))
                .count()
                .get_result(&mut conn)
                .await
        })?;
        Ok(count)
    }

    /// Move an item into `in_review`, e.g. when a reviewer opens it in the
    /// external dashboard. Idempotent against an already-resolved item: it
    /// stays resolved.
    pub async fn start_review(&self, item_id: &str) -> Result<()> {
        let affected = with_conn!(self.pool, conn => {
            diesel::update(
                review_queue_items
                    .filter(id.eq(item_id))
                    .filter(status.eq(ReviewStatus::Pending.as_str())),
            )
            .set(status.eq(ReviewStatus::InReview.as_str()))
            .execute(&mut conn)
            .await
        })?;
        if affected == 0 {
            return Err(AppError::NotFound(format!("review queue item {item_id}")));
        }
        Ok(())
    }

    pub async fn resolve(&self, item_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let affected = with_conn!(self.pool, conn => {
            diesel::update(review_queue_items.filter(id.eq(item_id)))
                .set((status.eq(ReviewStatus::Resolved.as_str()), resolved_at.eq(now)))
                .execute(&mut conn)
                .await
        })?;
        if affected == 0 {
            return Err(AppError::NotFound(format!("review queue item {item_id}")));
        }
        Ok(())
    }

    pub async fn get(&self, item_id: &str) -> Result<ReviewQueueItem> {
        let found: Option<ReviewQueueItem> = with_conn!(self.pool, conn => {
            review_queue_items.filter(id.eq(item_id))
                .first(&mut conn)
                .await
                .optional()
        })?;
        found.ok_or_else(|| AppError::NotFound(format!("review queue item {item_id}")))
    }

    /// A page of review-queue items across every job, optionally narrowed to
    /// one status.
    pub async fn list_page(&self, status_filter: Option<ReviewStatus>, skip: i64, limit: i64) -> Result<Vec<ReviewQueueItem>> {
        let rows: Vec<ReviewQueueItem> = with_conn!(self.pool, conn => {
            match status_filter {
                Some(s) => {
                    review_queue_items.filter(status.eq(s.as_str()))
                        .order(created_at.desc())
                        .offset(skip)
                        .limit(limit)
                        .load(&mut conn)
                        .await
                }
                None => {
                    review_queue_items
                        .order(created_at.desc())
                        .offset(skip)
                        .limit(limit)
                        .load(&mut conn)
                        .await
                }
            }
        })?;
        Ok(rows)
    }

    /// Delete every review-queue row under `for_job`, part of the job-delete
    /// cascade (§8 invariant 5: no orphan remains).
    pub async fn delete_by_job(&self, for_job: &str) -> Result<()> {
        with_conn!(self.pool, conn => {
            diesel::delete(review_queue_items.filter(job_id.eq(for_job))).execute(&mut conn).await
        })?;
        Ok(())
    }
}

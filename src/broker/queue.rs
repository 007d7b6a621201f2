//! Durable task queue: atomic claim, heartbeat, completion, backoff-based
//! retry, cancellation, and stuck-task reconciliation.
//!
//! Atomic claim is grounded on `repository/crawl/claim.rs`'s
//! `claim_pending_url` (`BEGIN IMMEDIATE` + `UPDATE ... WHERE status =
//! 'discovered'`), generalized to Postgres's `FOR UPDATE SKIP LOCKED` so
//! multiple broker workers never double-claim the same row under either
//! backend.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use rand::Rng;

use crate::error::Result;
use crate::repository::pool::DbPool;
use crate::schema::tasks::dsl::*;

use super::task::{Task, TaskStatus};

#[derive(Clone)]
pub struct TaskQueue {
    pool: DbPool,
}

impl TaskQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn enqueue(&self, task: &Task) -> Result<()> {
        crate::with_conn!(self.pool, conn => {
            diesel::insert_into(tasks).values(task).execute(&mut conn).await
        })?;
        Ok(())
    }

    /// Claim and lock the highest-priority eligible task (`pending`, due, not
    /// locked by anyone else) for `worker_id`. Priority 1 is highest, 5 is
    /// lowest (§4.H), so the lowest numeric value is claimed first. Returns
    /// `None` if the queue has nothing ready right now.
    pub async fn claim_next(&self, worker_id: &str) -> Result<Option<Task>> {
        let now = Utc::now().to_rfc3339();
        match &self.pool {
            DbPool::Sqlite(pool) => {
                let mut conn = pool.get().await?;
                diesel::sql_query("BEGIN IMMEDIATE").execute(&mut conn).await?;
                let outcome = Self::claim_row(&mut conn, &now, worker_id).await;
                match &outcome {
                    Ok(_) => diesel::sql_query("COMMIT").execute(&mut conn).await?,
                    Err(_) => diesel::sql_query("ROLLBACK").execute(&mut conn).await.unwrap_or(0),
                };
                Ok(outcome?)
            }
            DbPool::Postgres(pool) => {
                let mut conn = pool.get().await?;
                let conn = &mut *conn;
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    Box::pin(async move {
                        let candidate: Option<Task> = tasks
                            .filter(status.eq(TaskStatus::Pending.as_str()))
                            .filter(wake_at.le(&now))
                            .order((priority.asc(), wake_at.asc()))
                            .for_update()
                            .skip_locked()
                            .first(conn)
                            .await
                            .optional()?;
                        let Some(mut candidate) = candidate else {
                            return Ok(None);
                        };
                        candidate.attempt += 1;
                        diesel::update(tasks.filter(id.eq(&candidate.id)))
                            .set((
                                status.eq(TaskStatus::Running.as_str()),
                                locked_by.eq(worker_id),
                                heartbeat.eq(&now),
                                attempt.eq(candidate.attempt),
                            ))
                            .execute(conn)
                            .await?;
                        candidate.status = TaskStatus::Running.as_str().to_string();
                        candidate.locked_by = Some(worker_id.to_string());
                        candidate.heartbeat = Some(now.clone());
                        Ok(Some(candidate))
                    })
                })
                .await
                .map_err(Into::into)
            }
        }
    }

    async fn claim_row(
        conn: &mut crate::repository::pool::SqliteConn,
        now: &str,
        worker_id: &str,
    ) -> std::result::Result<Option<Task>, diesel::result::Error> {
        let candidate: Option<Task> = tasks
            .filter(status.eq(TaskStatus::Pending.as_str()))
            .filter(wake_at.le(now))
            .order((priority.asc(), wake_at.asc()))
            .first(conn)
            .await
            .optional()?;
        let Some(mut candidate) = candidate else {
            return Ok(None);
        };
        candidate.attempt += 1;
        diesel::update(tasks.filter(id.eq(&candidate.id)))
            .set((
                status.eq(TaskStatus::Running.as_str()),
                locked_by.eq(worker_id),
                heartbeat.eq(now),
                attempt.eq(candidate.attempt),
            ))
            .execute(conn)
            .await?;
        candidate.status = TaskStatus::Running.as_str().to_string();
        candidate.locked_by = Some(worker_id.to_string());
        candidate.heartbeat = Some(now.to_string());
        Ok(Some(candidate))
    }

    pub async fn heartbeat(&self, task_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        crate::with_conn!(self.pool, conn => {
            diesel::update(tasks.filter(id.eq(task_id)))
                .set(heartbeat.eq(now))
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    pub async fn complete(&self, task_id: &str) -> Result<()> {
        crate::with_conn!(self.pool, conn => {
            diesel::update(tasks.filter(id.eq(task_id)))
                .set((status.eq(TaskStatus::Completed.as_str()), locked_by.eq(None::<String>)))
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    /// Record a failed attempt. If attempts remain, re-enqueue with a
    /// jittered exponential backoff; otherwise mark permanently failed.
    pub async fn fail(&self, task: &Task, message: &str, base_backoff_secs: i64, max_backoff_secs: i64) -> Result<()> {
        if task.attempt >= task.max_attempts {
            crate::with_conn!(self.pool, conn => {
                diesel::update(tasks.filter(id.eq(&task.id)))
                    .set((
                        status.eq(TaskStatus::Failed.as_str()),
                        last_error.eq(message),
                        locked_by.eq(None::<String>),
                    ))
                    .execute(&mut conn)
                    .await
            })?;
            return Ok(());
        }
        let delay = backoff_delay(task.attempt, base_backoff_secs, max_backoff_secs);
        let retry_at = (Utc::now() + chrono::Duration::seconds(delay)).to_rfc3339();
        crate::with_conn!(self.pool, conn => {
            diesel::update(tasks.filter(id.eq(&task.id)))
                .set((
                    status.eq(TaskStatus::Pending.as_str()),
                    last_error.eq(message),
                    wake_at.eq(retry_at),
                    locked_by.eq(None::<String>),
                ))
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    pub async fn cancel(&self, task_id: &str) -> Result<()> {
        crate::with_conn!(self.pool, conn => {
            diesel::update(tasks.filter(id.eq(task_id)))
                .set(status.eq(TaskStatus::Cancelled.as_str()))
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    /// Tasks `running` with no heartbeat newer than `heartbeat_timeout_secs`
    /// are assumed to belong to a dead worker; reset to `pending` so another
    /// worker can pick them up. Returns the number reset.
    pub async fn reconcile_stuck(&self, heartbeat_timeout_secs: i64) -> Result<usize> {
        let cutoff = (Utc::now() - chrono::Duration::seconds(heartbeat_timeout_secs)).to_rfc3339();
        let affected = crate::with_conn!(self.pool, conn => {
            diesel::update(
                tasks
                    .filter(status.eq(TaskStatus::Running.as_str()))
                    .filter(heartbeat.lt(&cutoff)),
            )
            .set((status.eq(TaskStatus::Pending.as_str()), locked_by.eq(None::<String>)))
            .execute(&mut conn)
            .await
        })?;
        Ok(affected)
    }
}

/// Exponential backoff with +/-10% jitter, same formula as the teacher's
/// retry helper: `delay = min(max, base * 2^attempt) * (0.9 ..= 1.1)`.
fn backoff_delay(attempt: i32, base_secs: i64, max_secs: i64) -> i64 {
    let exp = base_secs.saturating_mul(1i64 << attempt.min(20).max(0));
    let capped = exp.min(max_secs).max(base_secs);
    let jitter = 0.9 + rand::thread_rng().gen::<f64>() * 0.2;
    ((capped as f64) * jitter).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_stays_jittered_within_bounds() {
        for attempt in 0..8 {
            let delay = backoff_delay(attempt, 2, 300);
            assert!(delay >= 1, "attempt {attempt} delay {delay} too small");
            assert!(delay <= 330, "attempt {attempt} delay {delay} exceeds jittered max");
        }
    }

    #[test]
    fn backoff_is_capped_at_max() {
        let delay = backoff_delay(30, 2, 300);
        assert!(delay <= 330);
    }
}

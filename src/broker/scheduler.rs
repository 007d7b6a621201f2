//! Scheduler: polls the queue on an interval, claims up to `concurrency`
//! tasks concurrently, and dispatches each to the handler registered for its
//! `task_type`. Loop shape mirrors the teacher's worker-poll pattern;
//! concurrent claim + dispatch generalizes `estuary-flow`'s
//! `ready_tasks_iter` polling loop (reference only, not the teacher).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::BrokerConfig;
use crate::error::Result;

use super::queue::TaskQueue;
use super::task::Task;

/// A handler for one `task_type`. Implementors live in the module that owns
/// the work (extraction worker, discovery worker, ...).
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, payload: Value) -> Result<()>;
}

pub struct Scheduler {
    queue: TaskQueue,
    config: BrokerConfig,
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
    worker_id: String,
}

impl Scheduler {
    pub fn new(queue: TaskQueue, config: BrokerConfig, worker_id: impl Into<String>) -> Self {
        Self {
            queue,
            config,
            handlers: HashMap::new(),
            worker_id: worker_id.into(),
        }
    }

    pub fn register(&mut self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(task_type.into(), handler);
    }

    /// Run until `shutdown` resolves. Each tick claims as many ready tasks
    /// as there are free concurrency permits and dispatches them without
    /// waiting for completion, so a slow document doesn't stall the rest of
    /// the queue.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let permits = Arc::new(Semaphore::new(self.config.concurrency));
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.dequeue_interval_ms));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.reconcile().await {
                        warn!(error = %e, "stuck-task reconciliation failed");
                    }
                    self.dequeue_batch(&permits).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn reconcile(&self) -> Result<()> {
        let reset = self.queue.reconcile_stuck(self.config.heartbeat_timeout_secs as i64).await?;
        if reset > 0 {
            info!(count = reset, "reset stuck tasks to pending");
        }
        Ok(())
    }

    async fn dequeue_batch(&self, permits: &Arc<Semaphore>) {
        loop {
            let Ok(permit) = permits.clone().try_acquire_owned() else {
                return;
            };
            let claimed = match self.queue.claim_next(&self.worker_id).await {
                Ok(Some(task)) => task,
                Ok(None) => {
                    drop(permit);
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "failed to claim next task");
                    drop(permit);
                    return;
                }
            };

            let queue = self.queue.clone();
            let handler = self.handlers.get(&claimed.task_type).cloned();
            let base = self.config.base_backoff_secs as i64;
            let max = self.config.max_backoff_secs as i64;

            tokio::spawn(async move {
                let _permit = permit;
                Self::run_one(queue, handler, claimed, base, max).await;
            });
        }
    }

    async fn run_one(
        queue: TaskQueue,
        handler: Option<Arc<dyn TaskHandler>>,
        task: Task,
        base_backoff_secs: i64,
        max_backoff_secs: i64,
    ) {
        let Some(handler) = handler else {
            warn!(task_type = %task.task_type, "no handler registered for task type");
            let _ = queue.fail(&task, "no handler registered", base_backoff_secs, max_backoff_secs).await;
            return;
        };

        match handler.handle(task.payload()).await {
            Ok(()) => {
                if let Err(e) = queue.complete(&task.id).await {
                    warn!(task_id = %task.id, error = %e, "failed to mark task completed");
                }
            }
            Err(e) => {
                let retryable = e.is_retryable();
                let message = e.to_string();
                if let Err(persist_err) = queue.fail(&task, &message, base_backoff_secs, max_backoff_secs).await {
                    warn!(task_id = %task.id, error = %persist_err, "failed to persist task failure");
                }
                if retryable {
                    info!(task_id = %task.id, attempt = task.attempt, "task failed transiently, will retry");
                } else {
                    warn!(task_id = %task.id, error = %message, "task failed permanently");
                }
            }
        }
    }
}

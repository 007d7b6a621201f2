//! Task: one unit of work on the durable queue (rasterize a document,
//! extract a document, discover a job's manifest, ...). The broker itself
//! is payload-agnostic; `task_type` tells the worker loop which handler to
//! dispatch to and `payload_json` carries that handler's arguments.

use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::schema::tasks;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = tasks)]
pub struct Task {
    pub id: String,
    pub task_type: String,
    pub payload_json: String,
    pub status: String,
    pub priority: i32,
    pub attempt: i32,
    pub max_attempts: i32,
    pub wake_at: String,
    pub heartbeat: Option<String>,
    pub locked_by: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
}

impl Task {
    pub fn new(task_type: impl Into<String>, payload: &Value, priority: i32, max_attempts: i32) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            task_type: task_type.into(),
            payload_json: payload.to_string(),
            status: TaskStatus::Pending.as_str().to_string(),
            priority,
            attempt: 0,
            max_attempts,
            wake_at: now.clone(),
            heartbeat: None,
            locked_by: None,
            last_error: None,
            created_at: now,
        }
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_str(&self.status).unwrap_or(TaskStatus::Failed)
    }

    pub fn payload(&self) -> Value {
        serde_json::from_str(&self.payload_json).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_task_starts_pending_at_attempt_zero() {
        let task = Task::new("extract_document", &json!({"document_id": "doc-1"}), 5, 3);
        assert_eq!(task.status(), TaskStatus::Pending);
        assert_eq!(task.attempt, 0);
        assert_eq!(task.payload()["document_id"], "doc-1");
    }
}

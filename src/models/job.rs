//! Job: the top-level unit of bulk extraction work over one upload session.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::jobs;

/// Lifecycle status of a job. Transitions are enforced by
/// `crate::lifecycle::jobs` (component G), not by this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Discovering,
    Running,
    Paused,
    Stopping,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Discovering => "discovering",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "discovering" => Some(Self::Discovering),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "stopping" => Some(Self::Stopping),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether this status is terminal (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Which storage-gateway source variant a job's `source_location` addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    UploadSession,
    Folder,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UploadSession => "upload_session",
            Self::Folder => "folder",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "upload_session" => Some(Self::UploadSession),
            "folder" => Some(Self::Folder),
            _ => None,
        }
    }
}

/// §4.H's priority range: 1 is highest, 5 is lowest.
pub const MIN_PRIORITY: i32 = 1;
pub const MAX_PRIORITY: i32 = 5;

/// Clamp a caller-supplied priority into `MIN_PRIORITY..=MAX_PRIORITY`.
pub fn clamp_priority(priority: i32) -> i32 {
    priority.clamp(MIN_PRIORITY, MAX_PRIORITY)
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: String,
    pub status: String,
    pub priority: i32,
    pub worker_id: Option<String>,
    /// Tagged union discriminator: `SourceKind::as_str()`. Stored alongside
    /// `source_location` rather than as a Diesel-mapped enum so a future
    /// source kind doesn't need a schema migration for the enum itself.
    pub source_kind: String,
    /// Opaque to everything but the storage gateway: an upload session id
    /// when `source_kind` is `upload_session`, a filesystem path when it's
    /// `folder`.
    pub source_location: String,
    pub document_type: Option<String>,
    pub template_id: Option<String>,
    pub total_documents: i32,
    pub processed_documents: i32,
    pub failed_documents: i32,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub started_at: Option<String>,
    pub paused_at: Option<String>,
    pub completed_at: Option<String>,
}

impl Job {
    /// Create a fresh job row (not yet persisted) pointed at `source_kind`'s
    /// `source_location`. `priority` defaults to `3`, the mid-point of the 1
    /// (highest) to 5 (lowest) range named in §4.H.
    pub fn new(source_kind: SourceKind, source_location: String, document_type: Option<String>) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            status: JobStatus::Pending.as_str().to_string(),
            priority: 3,
            worker_id: None,
            source_kind: source_kind.as_str().to_string(),
            source_location,
            document_type,
            template_id: None,
            total_documents: 0,
            processed_documents: 0,
            failed_documents: 0,
            error: None,
            created_at: now.clone(),
            updated_at: now,
            started_at: None,
            paused_at: None,
            completed_at: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        JobStatus::from_str(&self.status).unwrap_or(JobStatus::Failed)
    }

    pub fn source_kind(&self) -> SourceKind {
        SourceKind::from_str(&self.source_kind).unwrap_or(SourceKind::UploadSession)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        parse_rfc3339(&self.created_at)
    }
}

pub(crate) fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_starts_pending_with_mid_priority() {
        let job = Job::new(SourceKind::UploadSession, "session-1".to_string(), Some("bank_statement".to_string()));
        assert_eq!(job.status(), JobStatus::Pending);
        assert_eq!(job.priority, 3);
        assert_eq!(job.source_kind(), SourceKind::UploadSession);
    }

    #[test]
    fn folder_job_round_trips_source_kind() {
        let job = Job::new(SourceKind::Folder, "/in".to_string(), None);
        assert_eq!(job.source_kind(), SourceKind::Folder);
        assert_eq!(job.source_location, "/in");
    }

    #[test]
    fn clamp_priority_bounds_to_one_through_five() {
        assert_eq!(clamp_priority(0), MIN_PRIORITY);
        assert_eq!(clamp_priority(-5), MIN_PRIORITY);
        assert_eq!(clamp_priority(6), MAX_PRIORITY);
        assert_eq!(clamp_priority(2), 2);
    }

    #[test]
    fn completed_and_failed_are_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }
}

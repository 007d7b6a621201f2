//! ReviewQueueItem: a human-in-the-loop flag raised when a field could not
//! be extracted with confidence. Resolution (editing the value) belongs to
//! the external dashboard/UI collaborator; this crate only tracks the flag.

use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::clamp_priority;
use crate::schema::review_queue_items;

/// A review item's place in its own small workflow: raised, picked up by a
/// reviewer, then resolved (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    InReview,
    Resolved,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InReview => "in_review",
            Self::Resolved => "resolved",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_review" => Some(Self::InReview),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = review_queue_items)]
pub struct ReviewQueueItem {
    pub id: String,
    pub job_id: String,
    pub document_id: String,
    pub field_id: Option<String>,
    pub reason: String,
    pub status: String,
    pub error_message: Option<String>,
    pub error_type: Option<String>,
    pub priority: i32,
    pub created_at: String,
    pub resolved_at: Option<String>,
}

impl ReviewQueueItem {
    /// `priority` is inherited from the owning job at flag time, the same
    /// rule §4.H documents for broker task priority; it is clamped to the
    /// 1-5 range rather than rejected.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_id: String,
        document_id: String,
        field_id: Option<String>,
        reason: String,
        error_message: Option<String>,
        error_type: Option<String>,
        priority: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_id,
            document_id,
            field_id,
            reason,
            status: ReviewStatus::Pending.as_str().to_string(),
            error_message,
            error_type,
            priority: clamp_priority(priority),
            created_at: Utc::now().to_rfc3339(),
            resolved_at: None,
        }
    }

    pub fn status(&self) -> ReviewStatus {
        ReviewStatus::from_str(&self.status).unwrap_or(ReviewStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_item_starts_pending_with_clamped_priority() {
        let item = ReviewQueueItem::new(
            "job-1".to_string(),
            "doc-1".to_string(),
            Some("field-1".to_string()),
            "low confidence".to_string(),
            Some("llm returned null".to_string()),
            Some("transient".to_string()),
            9,
        );
        assert_eq!(item.status(), ReviewStatus::Pending);
        assert_eq!(item.priority, crate::models::job::MAX_PRIORITY);
        assert_eq!(item.error_message.as_deref(), Some("llm returned null"));
    }
}

//! Document: one source file within a job, tracked through rasterization,
//! extraction, and post-processing.

use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::documents;

/// Document processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Queued,
    Processing,
    Completed,
    Failed,
    NeedsReview,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::NeedsReview => "needs_review",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "needs_review" => Some(Self::NeedsReview),
            _ => None,
        }
    }

    /// `completed`, `failed`, and `needs_review` are the document's terminal
    /// states (§3, §8 invariant 2: terminal ⇒ no worker currently holds it).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::NeedsReview)
    }
}

/// Fine-grained progress marker within `Processing`, surfaced over the
/// event bus so the extraction worker's 13-step sequence is observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Rasterizing,
    Extracting,
    BuildingTranscript,
    PostProcessing,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rasterizing => "rasterizing",
            Self::Extracting => "extracting",
            Self::BuildingTranscript => "building_transcript",
            Self::PostProcessing => "post_processing",
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = documents)]
pub struct Document {
    pub id: String,
    pub job_id: String,
    pub status: String,
    pub processing_stage: Option<String>,
    pub original_filename: String,
    pub object_key: String,
    pub mime_type: String,
    pub document_type: Option<String>,
    pub page_count: Option<i32>,
    pub pages_processed: i32,
    pub retry_count: i32,
    pub max_retries: i32,
    pub worker_id: Option<String>,
    pub processing_started_at: Option<String>,
    pub total_fields_extracted: i32,
    pub fields_needing_review: i32,
    pub average_confidence: Option<f64>,
    pub extraction_time_ms: Option<i64>,
    pub error: Option<String>,
    pub error_type: Option<String>,
    /// `{"prompt_tokens": N, "completion_tokens": N, "total_tokens": N}`,
    /// summed across every vision-LLM batch call this document made. `None`
    /// until the document completes a pipeline run.
    pub token_usage_json: Option<String>,
    /// Estimated spend for this document's vision-LLM calls, derived from
    /// `token_usage_json` and the configured per-1k-token price. `None` when
    /// no price is configured (§6's cost column is best-effort, not billing).
    pub cost: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

impl Document {
    pub fn new(
        job_id: String,
        original_filename: String,
        object_key: String,
        mime_type: String,
        document_type: Option<String>,
        max_retries: i32,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            job_id,
            status: DocumentStatus::Queued.as_str().to_string(),
            processing_stage: None,
            original_filename,
            object_key,
            mime_type,
            document_type,
            page_count: None,
            pages_processed: 0,
            retry_count: 0,
            max_retries,
            worker_id: None,
            processing_started_at: None,
            total_fields_extracted: 0,
            fields_needing_review: 0,
            average_confidence: None,
            extraction_time_ms: None,
            error: None,
            error_type: None,
            token_usage_json: None,
            cost: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn status(&self) -> DocumentStatus {
        DocumentStatus::from_str(&self.status).unwrap_or(DocumentStatus::Failed)
    }

    /// Whether this document may be retried: terminal but not yet exhausted.
    pub fn can_retry(&self) -> bool {
        self.status().is_terminal() && self.retry_count < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_document_is_queued() {
        let doc = Document::new(
            "job-1".to_string(),
            "statement.pdf".to_string(),
            "sess/abc.pdf".to_string(),
            "application/pdf".to_string(),
            Some("bank_statement".to_string()),
            3,
        );
        assert_eq!(doc.status(), DocumentStatus::Queued);
        assert!(doc.page_count.is_none());
        assert!(!doc.can_retry());
    }

    #[test]
    fn can_retry_respects_max_retries() {
        let mut doc = Document::new(
            "job-1".to_string(),
            "a.pdf".to_string(),
            "sess/a.pdf".to_string(),
            "application/pdf".to_string(),
            None,
            2,
        );
        doc.status = DocumentStatus::Failed.as_str().to_string();
        doc.retry_count = 1;
        assert!(doc.can_retry());
        doc.retry_count = 2;
        assert!(!doc.can_retry());
    }
}

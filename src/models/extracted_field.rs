//! ExtractedField: one leaf value persisted as soon as the extraction
//! worker parses it, rather than waiting for the whole document to finish,
//! so a crash mid-document only loses the fields not yet flushed.
//!
//! `field_order` is a distinct non-negative integer within (document, page)
//! — an invariant enforced by the extraction worker, which assigns it as an
//! incremental index while persisting a batch in document order, never by
//! this type itself.

use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::schema::extracted_fields;

/// `validation_status`: whether a human has looked at this field yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    Reviewed,
    Corrected,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Reviewed => "reviewed",
            Self::Corrected => "corrected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "reviewed" => Some(Self::Reviewed),
            "corrected" => Some(Self::Corrected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = extracted_fields)]
pub struct ExtractedField {
    pub id: String,
    pub job_id: String,
    pub document_id: String,
    pub field_name: String,
    pub field_label: Option<String>,
    pub field_type: String,
    pub value_json: String,
    pub field_group: Option<String>,
    pub page_number: Option<i32>,
    pub field_order: i32,
    pub confidence: f64,
    pub validation_status: String,
    pub needs_manual_review: bool,
    pub bounding_box_json: Option<String>,
    pub section_name: Option<String>,
    pub source_location: Option<String>,
    pub extraction_context: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Extraction context is capped at 200 characters (§3 invariant).
const MAX_EXTRACTION_CONTEXT_CHARS: usize = 200;

#[allow(clippy::too_many_arguments)]
impl ExtractedField {
    pub fn new(
        job_id: String,
        document_id: String,
        field_name: String,
        field_label: Option<String>,
        field_type: String,
        value: &Value,
        field_group: Option<String>,
        page_number: Option<i32>,
        field_order: i32,
        confidence: f64,
        needs_manual_review: bool,
        section_name: Option<String>,
        source_location: Option<String>,
        extraction_context: Option<String>,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            job_id,
            document_id,
            field_name,
            field_label,
            field_type,
            value_json: value.to_string(),
            field_group,
            page_number,
            field_order,
            confidence: confidence.clamp(0.0, 1.0),
            validation_status: ValidationStatus::Pending.as_str().to_string(),
            needs_manual_review,
            bounding_box_json: None,
            section_name,
            source_location,
            extraction_context: extraction_context.map(|c| truncate_chars(&c, MAX_EXTRACTION_CONTEXT_CHARS)),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn value(&self) -> Value {
        serde_json::from_str(&self.value_json).unwrap_or(Value::Null)
    }

    pub fn validation_status(&self) -> ValidationStatus {
        ValidationStatus::from_str(&self.validation_status).unwrap_or(ValidationStatus::Pending)
    }

    /// A per-field failure: the value is absent and the field is flagged
    /// for human review, per spec §7's recovery behavior (null + needs
    /// review rather than failing the whole document).
    pub fn null_needs_review(
        job_id: String,
        document_id: String,
        field_name: String,
        page_number: Option<i32>,
        field_order: i32,
    ) -> Self {
        Self::new(
            job_id,
            document_id,
            field_name,
            None,
            "null".to_string(),
            &Value::Null,
            None,
            page_number,
            field_order,
            0.0,
            true,
            None,
            None,
            None,
        )
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_value_through_json_text() {
        let field = ExtractedField::new(
            "job-1".to_string(),
            "doc-1".to_string(),
            "account.balance".to_string(),
            Some("Account Balance".to_string()),
            "number".to_string(),
            &json!(1234.56),
            None,
            Some(2),
            0,
            0.98,
            false,
            None,
            None,
            None,
        );
        assert_eq!(field.value(), json!(1234.56));
        assert_eq!(field.validation_status(), ValidationStatus::Pending);
    }

    #[test]
    fn confidence_is_clamped_into_unit_interval() {
        let field = ExtractedField::new(
            "job-1".to_string(),
            "doc-1".to_string(),
            "x".to_string(),
            None,
            "string".to_string(),
            &json!("y"),
            None,
            None,
            0,
            1.5,
            false,
            None,
            None,
            None,
        );
        assert_eq!(field.confidence, 1.0);
    }

    #[test]
    fn extraction_context_is_truncated_to_200_chars() {
        let long_context = "x".repeat(500);
        let field = ExtractedField::new(
            "job-1".to_string(),
            "doc-1".to_string(),
            "x".to_string(),
            None,
            "string".to_string(),
            &json!("y"),
            None,
            None,
            0,
            0.5,
            false,
            None,
            None,
            Some(long_context),
        );
        assert_eq!(field.extraction_context.unwrap().chars().count(), 200);
    }

    #[test]
    fn null_needs_review_field_is_flagged() {
        let field = ExtractedField::null_needs_review(
            "job-1".to_string(),
            "doc-1".to_string(),
            "ssn".to_string(),
            Some(1),
            3,
        );
        assert!(field.needs_manual_review);
        assert_eq!(field.value(), Value::Null);
    }
}

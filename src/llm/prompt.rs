//! Prompt builder (component D): a pure function mapping
//! `(task, content_type, document_type, context) -> (prompt, schema)`.
//!
//! Grounded on
//! `original_source/backend-bulk/app/services/prompt_service.py`'s
//! `get_task_prompt` dispatch, re-expressed as Rust enums instead of the
//! original's string task names, with the prose itself trimmed down rather
//! than translated verbatim.

use serde_json::{json, Value};

/// Which extraction task the vision model is being asked to perform.
#[derive(Debug, Clone)]
pub enum ExtractionTask {
    /// Generic structured extraction with no known document type or
    /// template: discover the field structure and values together.
    GenericExtraction,
    /// Bank-statement extraction, with multi-page table continuation.
    BankStatement { continuation: Option<BankStatementContinuation> },
    /// Match the document against a set of named column mappings.
    TemplateMatching { candidate_field_names: Vec<String> },
    /// Field-structure discovery only (values forced to null), used when
    /// building a new template from a sample document.
    FieldDetection,
}

/// Carried-forward context from a bank statement's first page, so
/// continuation pages extract the same columns under the same names.
#[derive(Debug, Clone)]
pub struct BankStatementContinuation {
    pub page_number: i32,
    pub table_headers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Image,
    Text,
}

/// A built prompt: the text sent to the model plus the JSON schema its
/// response is constrained to.
#[derive(Debug, Clone)]
pub struct PromptSpec {
    pub system_prompt: String,
    pub user_prompt: String,
    pub schema: Value,
}

/// Build the system/user prompt and response schema for a task. Pure:
/// same inputs always produce the same prompt text.
pub fn build_prompt(task: &ExtractionTask, content_type: ContentType, document_type: Option<&str>) -> PromptSpec {
    match task {
        ExtractionTask::GenericExtraction => generic_extraction_prompt(content_type, document_type),
        ExtractionTask::BankStatement { continuation } => bank_statement_prompt(continuation.as_ref()),
        ExtractionTask::TemplateMatching { candidate_field_names } => {
            template_matching_prompt(candidate_field_names)
        }
        ExtractionTask::FieldDetection => field_detection_prompt(),
    }
}

fn generic_extraction_prompt(content_type: ContentType, document_type: Option<&str>) -> PromptSpec {
    let source = match content_type {
        ContentType::Image => "the attached page image(s)",
        ContentType::Text => "the attached document text",
    };
    let hint = document_type
        .map(|t| format!(" The document type is known to be `{t}`; use that to guide field naming."))
        .unwrap_or_default();

    let system_prompt = format!(
        "You extract structured data from {source}. Use the exact field names and labels as they \
         appear in the document, not a standardized vocabulary. Group related fields into sections \
         that mirror the document's own layout. Every field you find must carry a confidence between \
         0 and 1 reflecting how legible and unambiguous the source value was.{hint}"
    );
    let user_prompt =
        "Extract every field and value visible on this page. Use null for illegible or absent \
         values rather than guessing. Preserve the document's natural section structure; do not \
         invent headings that are not present."
            .to_string();

    let schema = json!({
        "type": "object",
        "properties": {
            "sections": {"type": "object"},
        },
        "additionalProperties": true,
    });

    PromptSpec { system_prompt, user_prompt, schema }
}

fn bank_statement_prompt(continuation: Option<&BankStatementContinuation>) -> PromptSpec {
    let (system_prompt, user_prompt) = match continuation {
        None => (
            "You are extracting data from a bank statement's first page. Capture every account \
             header field under its exact PDF label, then capture the transaction table using the \
             exact column headers shown on the page."
                .to_string(),
            "Extract account header fields verbatim, then emit `_table_headers` (the exact column \
             names of the transaction table) followed by `transactions`, an array of row objects \
             keyed by those same header names. Keep amounts numeric and use null for empty cells."
                .to_string(),
        ),
        Some(ctx) => {
            let headers = ctx.table_headers.join(", ");
            (
                format!(
                    "You are extracting data from page {} of a bank statement: a continuation page. \
                     The transaction table uses the same {} columns established on page 1: {}.",
                    ctx.page_number,
                    ctx.table_headers.len(),
                    headers
                ),
                "Extract every transaction row using exactly the carried-forward column names, plus \
                 any page header, running totals, interest/charge lines, or footer text also visible \
                 on this page. Use null for empty cells but always include every column key."
                    .to_string(),
            )
        }
    };

    let schema = json!({
        "type": "object",
        "properties": {
            "document_type": {"type": "string"},
            "page_number": {"type": "integer"},
            "is_continuation": {"type": "boolean"},
            "_table_headers": {"type": "array", "items": {"type": "string"}},
            "transactions": {"type": "array", "items": {"type": "object"}},
        },
        "additionalProperties": true,
    });

    PromptSpec { system_prompt, user_prompt, schema }
}

fn template_matching_prompt(candidate_field_names: &[String]) -> PromptSpec {
    let names = candidate_field_names.join(", ");
    let system_prompt = format!(
        "You are matching columns in this document against a known set of target field names: {names}. \
         For each target field, report the document column or label you believe corresponds to it, or \
         null if the document does not contain a matching column."
    );
    let user_prompt =
        "Return a mapping from each target field name to the matching source column/label found in \
         the document, with a confidence score per match."
            .to_string();

    let schema = json!({
        "type": "object",
        "properties": {
            "matches": {
                "type": "object",
                "additionalProperties": {
                    "type": "object",
                    "properties": {
                        "source_field": {"type": ["string", "null"]},
                        "confidence": {"type": "number"},
                    },
                },
            },
        },
        "additionalProperties": true,
    });

    PromptSpec { system_prompt, user_prompt, schema }
}

fn field_detection_prompt() -> PromptSpec {
    let system_prompt =
        "You are identifying the field structure of a document for template creation, not extracting \
         values. Set every field's value to null. Preserve the document's natural sectioning; do not \
         invent headings."
            .to_string();
    let user_prompt =
        "Return the hierarchical field structure you observe: sections as objects, repeated rows as \
         arrays of objects, every leaf value set to null.".to_string();

    let schema = json!({
        "type": "object",
        "additionalProperties": true,
    });

    PromptSpec { system_prompt, user_prompt, schema }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bank_statement_first_page_has_no_carried_headers() {
        let spec = build_prompt(
            &ExtractionTask::BankStatement { continuation: None },
            ContentType::Image,
            Some("bank_statement"),
        );
        assert!(spec.system_prompt.contains("first page"));
    }

    #[test]
    fn bank_statement_continuation_carries_forward_headers() {
        let ctx = BankStatementContinuation {
            page_number: 2,
            table_headers: vec!["Date".to_string(), "Narration".to_string()],
        };
        let spec = build_prompt(
            &ExtractionTask::BankStatement { continuation: Some(ctx) },
            ContentType::Image,
            Some("bank_statement"),
        );
        assert!(spec.system_prompt.contains("Date, Narration"));
        assert!(spec.system_prompt.contains("page 2"));
    }

    #[test]
    fn generic_extraction_mentions_document_type_hint() {
        let spec = build_prompt(&ExtractionTask::GenericExtraction, ContentType::Image, Some("invoice"));
        assert!(spec.system_prompt.contains("invoice"));
    }

    #[test]
    fn field_detection_schema_allows_any_shape() {
        let spec = build_prompt(&ExtractionTask::FieldDetection, ContentType::Image, None);
        assert_eq!(spec.schema["additionalProperties"], json!(true));
    }
}

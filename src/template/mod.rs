//! Template engine (component K): column resolution against a document's
//! extracted fields/transcript, plus the pure-function post-processing
//! transform library. Grounded function-for-function in
//! `original_source/backend-bulk/app/services/post_processor.py`, not a
//! line translation of it.

pub mod resolve;
pub mod transforms;

use serde::{Deserialize, Serialize};

pub use resolve::{resolve_columns, ColumnResolution, ResolutionOutput};
pub use transforms::apply_transform;

/// A document-type data shape hint for a template column, used to pick a
/// sensible default transform when the template doesn't specify one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnDataType {
    Text,
    Number,
    Date,
    Currency,
    YesNo,
}

/// One target column in a `MappingTemplate`: what it's called externally,
/// which keywords identify it in a document, and how its resolved value
/// should be post-processed on export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub external_column_name: String,
    pub search_keywords: Vec<String>,
    pub extraction_hint: Option<String>,
    pub expected_section: Option<String>,
    pub data_type: ColumnDataType,
    pub post_process_type: Option<String>,
    pub post_process_config: serde_json::Value,
    pub default_value: Option<String>,
    pub example_value: Option<String>,
}

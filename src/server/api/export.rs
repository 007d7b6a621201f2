//! Flat, template-free exports: every extracted field of every document in
//! a job, as CSV text, a JSON preview, or a JSON "excel" shape.
//!
//! Spec's Non-goal on "the CSV/XLSX writer" rules out a real XLSX-binary
//! encoder (no such crate in this workspace); `/export/excel` instead
//! returns the same resolved rows the dashboard's own spreadsheet-rendering
//! layer would consume, leaving the binary encoding to that external
//! collaborator (DESIGN.md's recorded decision).

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::Result;
use crate::server::AppState;

/// One row per document: `document_id`, `original_filename`, then every
/// extracted field keyed by `field_name`.
async fn summary_rows(state: &AppState, job_id: &str) -> Result<Vec<Map<String, Value>>> {
    let documents = state.documents.list_by_job(job_id).await?;
    let mut rows = Vec::with_capacity(documents.len());
    for document in &documents {
        let fields = state.fields.list_by_document(&document.id).await?;
        let mut row = Map::new();
        row.insert("document_id".to_string(), json!(document.id));
        row.insert("original_filename".to_string(), json!(document.original_filename));
        for field in &fields {
            row.insert(field.field_name.clone(), field.value());
        }
        rows.push(row);
    }
    Ok(rows)
}

/// One row per (document, field): long format, useful when documents don't
/// share a consistent field set.
async fn pivoted_rows(state: &AppState, job_id: &str) -> Result<Vec<Map<String, Value>>> {
    let fields = state.fields.list_by_job(job_id).await?;
    let mut rows = Vec::with_capacity(fields.len());
    for field in &fields {
        let mut row = Map::new();
        row.insert("document_id".to_string(), json!(field.document_id));
        row.insert("field_name".to_string(), json!(field.field_name));
        row.insert("value".to_string(), field.value());
        row.insert("confidence".to_string(), json!(field.confidence));
        rows.push(row);
    }
    Ok(rows)
}

fn rows_to_csv(rows: &[Map<String, Value>]) -> String {
    if rows.is_empty() {
        return String::new();
    }
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let mut out = String::new();
    out.push_str(&columns.iter().map(|c| csv_escape(c)).collect::<Vec<_>>().join(","));
    out.push('\n');
    for row in rows {
        let line: Vec<String> = columns
            .iter()
            .map(|c| row.get(c).map(value_to_csv_cell).unwrap_or_default())
            .map(|v| csv_escape(&v))
            .collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

fn value_to_csv_cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub async fn export_csv(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<Response> {
    let rows = summary_rows(&state, &job_id).await?;
    let csv = rows_to_csv(&rows);
    Ok((
        [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
        csv,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct ExcelQuery {
    #[serde(default)]
    pub format: ExcelFormat,
}

#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExcelFormat {
    #[default]
    Summary,
    Pivoted,
}

pub async fn export_excel(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<ExcelQuery>,
) -> Result<Json<Value>> {
    let rows = match query.format {
        ExcelFormat::Summary => summary_rows(&state, &job_id).await?,
        ExcelFormat::Pivoted => pivoted_rows(&state, &job_id).await?,
    };
    Ok(Json(json!({ "format": query.format_str(), "rows": rows })))
}

impl ExcelFormat {
    fn format_str(self) -> &'static str {
        match self {
            ExcelFormat::Summary => "summary",
            ExcelFormat::Pivoted => "pivoted",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    pub limit: Option<usize>,
}

pub async fn export_preview(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<Value>> {
    let mut rows = summary_rows(&state, &job_id).await?;
    let limit = query.limit.unwrap_or(50);
    rows.truncate(limit);
    Ok(Json(json!({ "rows": rows })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_escapes_commas_and_quotes() {
        let mut row = Map::new();
        row.insert("name".to_string(), json!("Doe, Jane \"J\""));
        let csv = rows_to_csv(&[row]);
        assert!(csv.contains("\"Doe, Jane \"\"J\"\"\""));
    }

    #[test]
    fn empty_rows_produce_empty_csv() {
        assert_eq!(rows_to_csv(&[]), "");
    }
}

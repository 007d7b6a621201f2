//! Mapping-template CRUD plus the two template/job join endpoints: `apply`
//! (column resolution only, a dry run) and `export` (resolution + transform
//! chain, producing the rows the dashboard renders as a spreadsheet).

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, Result};
use crate::models::MappingTemplate;
use crate::server::AppState;
use crate::template::{apply_transform, resolve_columns};

#[derive(Debug, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    pub document_type: String,
    pub column_mappings: Vec<crate::template::ColumnMapping>,
}

pub async fn create_template(
    State(state): State<AppState>,
    Json(body): Json<CreateTemplateRequest>,
) -> Result<(axum::http::StatusCode, Json<MappingTemplate>)> {
    let template = MappingTemplate::new(body.name, body.document_type, body.column_mappings);
    state.templates.create(&template).await?;
    Ok((axum::http::StatusCode::CREATED, Json(template)))
}

#[derive(Debug, Deserialize)]
pub struct ListTemplatesQuery {
    pub document_type: String,
}

pub async fn list_templates(State(state): State<AppState>, Query(query): Query<ListTemplatesQuery>) -> Result<Json<Vec<MappingTemplate>>> {
    Ok(Json(state.templates.list_for_document_type(&query.document_type).await?))
}

pub async fn get_template(State(state): State<AppState>, Path(template_id): Path<String>) -> Result<Json<MappingTemplate>> {
    Ok(Json(state.templates.get(&template_id).await?))
}

pub async fn delete_template(State(state): State<AppState>, Path(template_id): Path<String>) -> Result<axum::http::StatusCode> {
    state.templates.delete(&template_id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct TemplateIdQuery {
    pub template_id: String,
}

/// `POST /templates/apply/{job_id}`: resolves the template's columns against
/// every document in the job and returns the per-document resolution
/// reports, without applying transforms or persisting anything.
pub async fn apply_template(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<TemplateIdQuery>,
) -> Result<Json<Value>> {
    let template = state.templates.get(&query.template_id).await?;
    let columns = template.column_mappings();
    let documents = state.documents.list_by_job(&job_id).await?;

    let mut reports = Vec::with_capacity(documents.len());
    for document in &documents {
        let fields = state.fields.list_by_document(&document.id).await?;
        let resolution = resolve_columns(&template.id, &columns, &fields);
        reports.push(json!({ "document_id": document.id, "resolution": resolution }));
    }
    Ok(Json(json!({ "template_id": template.id, "documents": reports })))
}

/// `POST /templates/export/{job_id}`: resolves every column then applies its
/// transform chain, producing the export row shape from §4.K ("Output rows
/// `[{external_column_name: transformed_value}]`, one per document").
pub async fn export_template(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<TemplateIdQuery>,
) -> Result<Json<Value>> {
    let template = state.templates.get(&query.template_id).await?;
    let columns = template.column_mappings();
    let documents = state.documents.list_by_job(&job_id).await?;
    if documents.is_empty() {
        return Err(AppError::NotFound(format!("no documents for job {job_id}")));
    }

    let mut rows = Vec::with_capacity(documents.len());
    for document in &documents {
        let fields = state.fields.list_by_document(&document.id).await?;
        let resolution = resolve_columns(&template.id, &columns, &fields);
        let by_field_name: HashMap<&str, &crate::models::ExtractedField> =
            fields.iter().map(|f| (f.field_name.as_str(), f)).collect();

        let mut row = serde_json::Map::new();
        for column in &columns {
            let resolved = resolution.mappings.iter().find(|m| m.external_column == column.external_column_name);
            let raw_value = resolved
                .and_then(|m| by_field_name.get(m.db_field_name.as_str()))
                .map(|f| f.value())
                .unwrap_or(Value::Null);
            let transformed = match &column.post_process_type {
                Some(transform_type) => apply_transform(transform_type, &raw_value, &column.post_process_config),
                None => raw_value,
            };
            let value = if transformed.is_null() {
                column.default_value.clone().map(Value::String).unwrap_or(Value::Null)
            } else {
                transformed
            };
            row.insert(column.external_column_name.clone(), value);
        }
        rows.push(Value::Object(row));
    }
    Ok(Json(json!({ "template_id": template.id, "rows": rows })))
}

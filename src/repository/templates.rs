//! Mapping-template repository: reusable column-mapping/transform-chain
//! definitions, keyed by document type.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::error::{AppError, Result};
use crate::models::MappingTemplate;
use crate::repository::pool::DbPool;
use crate::schema::mapping_templates::dsl::*;
use crate::with_conn;

#[derive(Clone)]
pub struct TemplateRepository {
    pool: DbPool,
}

impl TemplateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, template: &MappingTemplate) -> Result<()> {
        with_conn!(self.pool, conn => {
            diesel::insert_into(mapping_templates)
                .values(template)
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    pub async fn get(&self, template_id: &str) -> Result<MappingTemplate> {
        let found: Option<MappingTemplate> = with_conn!(self.pool, conn => {
            mapping_templates.filter(id.eq(template_id))
                .first(&mut conn)
                .await
                .optional()
        })?;
        found.ok_or_else(|| AppError::NotFound(format!("mapping template {template_id}")))
    }

    pub async fn list_for_document_type(&self, doc_type: &str) -> Result<Vec<MappingTemplate>> {
        let rows: Vec<MappingTemplate> = with_conn!(self.pool, conn => {
            mapping_templates.filter(document_type.eq(doc_type))
                .order(updated_at.desc())
                .load(&mut conn)
                .await
        })?;
        Ok(rows)
    }

    pub async fn update(&self, template: &MappingTemplate) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let affected = with_conn!(self.pool, conn => {
            diesel::update(mapping_templates.filter(id.eq(&template.id)))
                .set((
                    name.eq(&template.name),
                    column_mappings_json.eq(&template.column_mappings_json),
                    updated_at.eq(now),
                ))
                .execute(&mut conn)
                .await
        })?;
        if affected == 0 {
            return Err(AppError::NotFound(format!("mapping template {}", template.id)));
        }
        Ok(())
    }

    pub async fn delete(&self, template_id: &str) -> Result<()> {
        let affected = with_conn!(self.pool, conn => {
            diesel::delete(mapping_templates.filter(id.eq(template_id)))
                .execute(&mut conn)
                .await
        })?;
        if affected == 0 {
            return Err(AppError::NotFound(format!("mapping template {template_id}")));
        }
        Ok(())
    }
}

//! MappingTemplate: a named, versioned column-to-field mapping plus its
//! transform chain, persisted so it can be reused across jobs of the same
//! document type.

use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::mapping_templates;
use crate::template::ColumnMapping;

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = mapping_templates)]
pub struct MappingTemplate {
    pub id: String,
    pub name: String,
    pub document_type: String,
    pub column_mappings_json: String,
    pub created_at: String,
    pub updated_at: String,
}

impl MappingTemplate {
    pub fn new(name: String, document_type: String, column_mappings: Vec<ColumnMapping>) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            document_type,
            column_mappings_json: serde_json::to_string(&column_mappings).unwrap_or_default(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn column_mappings(&self) -> Vec<ColumnMapping> {
        serde_json::from_str(&self.column_mappings_json).unwrap_or_default()
    }
}

//! DocumentTranscript: the flattened, human-readable transcript plus a
//! path index produced by component J after extraction completes.

use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::document_transcripts;

/// One entry in the transcript index: a dotted field path and the byte
/// offset range in `transcript_text` where its rendered value appears.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptIndexEntry {
    pub field_path: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = document_transcripts)]
pub struct DocumentTranscript {
    pub id: String,
    pub document_id: String,
    pub transcript_text: String,
    pub index_json: String,
    pub created_at: String,
}

impl DocumentTranscript {
    pub fn new(document_id: String, transcript_text: String, index: Vec<TranscriptIndexEntry>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            document_id,
            transcript_text,
            index_json: serde_json::to_string(&index).unwrap_or_else(|_| "[]".to_string()),
            created_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn index(&self) -> Vec<TranscriptIndexEntry> {
        serde_json::from_str(&self.index_json).unwrap_or_default()
    }
}

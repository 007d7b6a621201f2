//! Document transcript repository: one row per document, written once by
//! the extraction worker after post-processing (component J's output).

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::error::{AppError, Result};
use crate::models::DocumentTranscript;
use crate::repository::pool::DbPool;
use crate::schema::document_transcripts::dsl::*;
use crate::with_conn;

#[derive(Clone)]
pub struct TranscriptRepository {
    pool: DbPool,
}

impl TranscriptRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, transcript: &DocumentTranscript) -> Result<()> {
        with_conn!(self.pool, conn => {
            diesel::insert_into(document_transcripts)
                .values(transcript)
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    pub async fn get_for_document(&self, for_document: &str) -> Result<DocumentTranscript> {
        let found: Option<DocumentTranscript> = with_conn!(self.pool, conn => {
            document_transcripts.filter(document_id.eq(for_document))
                .first(&mut conn)
                .await
                .optional()
        })?;
        found.ok_or_else(|| AppError::NotFound(format!("transcript for document {for_document}")))
    }

    /// Delete the transcripts for a set of document ids. The table has no
    /// `job_id` column, so the job-delete cascade looks up its documents'
    /// ids first and passes them here.
    pub async fn delete_for_documents(&self, document_ids: &[String]) -> Result<()> {
        if document_ids.is_empty() {
            return Ok(());
        }
        with_conn!(self.pool, conn => {
            diesel::delete(document_transcripts.filter(document_id.eq_any(document_ids)))
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }
}

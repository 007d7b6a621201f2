//! Extracted-field repository. Fields are flushed one-by-one as the
//! extraction worker parses them (see `models::ExtractedField`'s doc
//! comment), but a document's full leaf set is also written in a single
//! batch at the end of post-processing; `insert_batch` uses the Postgres
//! COPY protocol for that case, the same bulk-load shortcut the teacher
//! reaches for in its crawl-result ingestion path.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::error::Result;
use crate::models::ExtractedField;
use crate::repository::pool::DbPool;
use crate::schema::extracted_fields::dsl::*;
use crate::with_conn;

#[derive(Clone)]
pub struct FieldRepository {
    pool: DbPool,
}

impl FieldRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, field: &ExtractedField) -> Result<()> {
        with_conn!(self.pool, conn => {
            diesel::insert_into(extracted_fields)
                .values(field)
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    /// Bulk-insert a document's extracted fields. On Postgres this goes
    /// through the binary COPY protocol for throughput; on SQLite it falls
    /// back to a single multi-row insert (SQLite has no COPY equivalent and
    /// doesn't need one at the volumes the test backend sees).
    pub async fn insert_batch(&self, fields: &[ExtractedField]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        #[cfg(feature = "postgres-copy")]
        {
            if let DbPool::Postgres(_) = &self.pool {
                return self.insert_batch_copy(fields).await;
            }
        }
        with_conn!(self.pool, conn => {
            diesel::insert_into(extracted_fields)
                .values(fields)
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    #[cfg(feature = "postgres-copy")]
    async fn insert_batch_copy(&self, fields: &[ExtractedField]) -> Result<()> {
        use crate::repository::util::pg_to_diesel_error;
        use futures_util::pin_mut;
        use futures_util::SinkExt;
        use tokio_postgres::types::Type;

        let database_url = match &self.pool {
            DbPool::Postgres(pool) => pool.raw_url().to_string(),
            _ => unreachable!("insert_batch_copy is only called for the Postgres pool"),
        };
        let (client, connection) = tokio_postgres::connect(&database_url, tokio_postgres::NoTls)
            .await
            .map_err(pg_to_diesel_error)?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(error = %e, "postgres copy-sink connection dropped");
            }
        });

        let sink = client
            .copy_in::<_, bytes::Bytes>(
                "COPY extracted_fields (id, job_id, document_id, field_name, field_label, \
                 field_type, value_json, field_group, page_number, field_order, confidence, \
                 validation_status, needs_manual_review, bounding_box_json, section_name, \
                 source_location, extraction_context, created_at, updated_at) \
                 FROM STDIN BINARY",
            )
            .await
            .map_err(pg_to_diesel_error)?;
        let writer = tokio_postgres::binary_copy::BinaryCopyInWriter::new(
            sink,
            &[
                Type::TEXT,
                Type::TEXT,
                Type::TEXT,
                Type::TEXT,
                Type::TEXT,
                Type::TEXT,
                Type::TEXT,
                Type::TEXT,
                Type::INT4,
                Type::INT4,
                Type::FLOAT8,
                Type::TEXT,
                Type::BOOL,
                Type::TEXT,
                Type::TEXT,
                Type::TEXT,
                Type::TEXT,
                Type::TEXT,
                Type::TEXT,
            ],
        );
        pin_mut!(writer);
        for field in fields {
            writer
                .as_mut()
                .write(&[
                    &field.id,
                    &field.job_id,
                    &field.document_id,
                    &field.field_name,
                    &field.field_label,
                    &field.field_type,
                    &field.value_json,
                    &field.field_group,
                    &field.page_number,
                    &field.field_order,
                    &field.confidence,
                    &field.validation_status,
                    &field.needs_manual_review,
                    &field.bounding_box_json,
                    &field.section_name,
                    &field.source_location,
                    &field.extraction_context,
                    &field.created_at,
                    &field.updated_at,
                ])
                .await
                .map_err(pg_to_diesel_error)?;
        }
        writer.finish().await.map_err(pg_to_diesel_error)?;
        Ok(())
    }

    pub async fn list_by_document(&self, for_document: &str) -> Result<Vec<ExtractedField>> {
        let rows: Vec<ExtractedField> = with_conn!(self.pool, conn => {
            extracted_fields.filter(document_id.eq(for_document))
                .order((page_number.asc(), field_order.asc()))
                .load(&mut conn)
                .await
        })?;
        Ok(rows)
    }

    pub async fn list_by_job(&self, for_job: &str) -> Result<Vec<ExtractedField>> {
        let rows: Vec<ExtractedField> = with_conn!(self.pool, conn => {
            extracted_fields.filter(job_id.eq(for_job))
                .order((document_id.asc(), page_number.asc(), field_order.asc()))
                .load(&mut conn)
                .await
        })?;
        Ok(rows)
    }

    pub async fn list_needing_review(&self, for_document: &str) -> Result<Vec<ExtractedField>> {
        let rows: Vec<ExtractedField> = with_conn!(self.pool, conn => {
            extracted_fields.filter(document_id.eq(for_document))
                .filter(needs_manual_review.eq(true))
                .load(&mut conn)
                .await
        })?;
        Ok(rows)
    }

    pub async fn mark_reviewed(&self, field_id: &str) -> Result<()> {
        with_conn!(self.pool, conn => {
            diesel::update(extracted_fields.filter(id.eq(field_id)))
                .set((
                    validation_status.eq(crate::models::ValidationStatus::Reviewed.as_str()),
                    needs_manual_review.eq(false),
                ))
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    /// Delete every extracted field under `for_job`, part of the job-delete
    /// cascade (§8 invariant 5: no orphan remains).
    pub async fn delete_by_job(&self, for_job: &str) -> Result<()> {
        with_conn!(self.pool, conn => {
            diesel::delete(extracted_fields.filter(job_id.eq(for_job))).execute(&mut conn).await
        })?;
        Ok(())
    }
}

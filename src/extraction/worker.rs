use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;

use crate::broker::TaskHandler;
use crate::config::LlmConfig;
use crate::error::{AppError, Result};
use crate::events::{EventBus, JobEvent};
use crate::extraction::parse::{build_page_tree, field_type_str, flatten_response};
use crate::lifecycle::LifecycleManager;
use crate::llm::{
    build_prompt, BankStatementContinuation, ContentType, ExtractionTask, PageImage, TokenUsage, VisionClient,
    VisionRequest,
};
use crate::models::{Document, DocumentStatus, ExtractedField, Job, ProcessingStage, ReviewQueueItem};
use crate::raster::{RasterPage, Rasterizer};
use crate::repository::{DocumentRepository, FieldRepository, JobRepository, ReviewQueueRepository, TranscriptRepository};
use crate::storage::StorageGateway;
use crate::transcript::{build_transcript, PageTree};

/// A contiguous group of pages dispatched to the vision-LLM in one call
/// (§4.E step 6, "page batches of size B").
struct PageBatch {
    start_page: i32,
    images: Vec<PageImage>,
}

fn form_batches(pages: &[RasterPage], batch_size: usize) -> Vec<PageBatch> {
    let batch_size = batch_size.max(1);
    pages
        .chunks(batch_size)
        .map(|chunk| PageBatch {
            start_page: chunk[0].page_number,
            images: chunk
                .iter()
                .map(|p| PageImage { page_number: p.page_number, png_bytes: p.png_bytes.clone() })
                .collect(),
        })
        .collect()
}

/// Runs the full per-document extraction pipeline (§4.E). One worker
/// instance is shared across documents; it owns no per-document state.
pub struct ExtractionWorker {
    documents: DocumentRepository,
    jobs: JobRepository,
    fields: FieldRepository,
    transcripts: TranscriptRepository,
    review_queue: ReviewQueueRepository,
    storage: Arc<dyn StorageGateway>,
    rasterizer: Rasterizer,
    vision: VisionClient,
    events: Arc<dyn EventBus>,
    lifecycle: Arc<LifecycleManager>,
    worker_id: String,
    llm_config: LlmConfig,
}

impl ExtractionWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        documents: DocumentRepository,
        jobs: JobRepository,
        fields: FieldRepository,
        transcripts: TranscriptRepository,
        review_queue: ReviewQueueRepository,
        storage: Arc<dyn StorageGateway>,
        rasterizer: Rasterizer,
        vision: VisionClient,
        events: Arc<dyn EventBus>,
        lifecycle: Arc<LifecycleManager>,
        worker_id: String,
        llm_config: LlmConfig,
    ) -> Self {
        Self {
            documents,
            jobs,
            fields,
            transcripts,
            review_queue,
            storage,
            rasterizer,
            vision,
            events,
            lifecycle,
            worker_id,
            llm_config,
        }
    }

    /// Process one document end to end. Idempotent: a document not in
    /// `queued`/`pending` is skipped rather than reprocessed (step 1).
    pub async fn process_document(&self, document_id: &str) -> Result<()> {
        let document = self.documents.get(document_id).await?;
        if document.status() != DocumentStatus::Queued {
            return Ok(());
        }
        let job = self.jobs.get(&document.job_id).await?;

        if !self.documents.claim_for_processing(document_id, &self.worker_id).await? {
            // another worker won the race; nothing to do here.
            return Ok(());
        }
        let _ = self
            .events
            .publish(JobEvent::DocumentStarted { job_id: job.id.clone(), document_id: document_id.to_string() })
            .await;

        match self.run_pipeline(&document, &job).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.fail_document(&document, &job, &err).await?;
                Err(err)
            }
        }
    }

    async fn run_pipeline(&self, document: &Document, job: &Job) -> Result<()> {
        let start = Instant::now();

        self.documents.set_stage(&document.id, ProcessingStage::Rasterizing).await?;
        let bytes = self.storage.fetch(&document.object_key).await?;

        let page_count = self.rasterizer.page_count(&bytes)?;
        self.documents.set_page_count(&document.id, page_count).await?;

        let pages = self.rasterizer.rasterize(&bytes)?;
        if pages.is_empty() {
            return Err(AppError::Permanent("rasterization produced zero pages".to_string()));
        }

        let batches = form_batches(&pages, self.llm_config.pages_per_batch);

        self.documents.set_stage(&document.id, ProcessingStage::Extracting).await?;
        let (responses, usage) = self.dispatch_batches(document.document_type.as_deref(), &batches).await?;
        self.documents.increment_pages_processed(&document.id, pages.len() as i32).await?;

        let (extracted_fields, page_trees) =
            self.build_fields(job, document, &responses);

        self.documents.set_stage(&document.id, ProcessingStage::BuildingTranscript).await?;
        let page_refs: Vec<PageTree<'_>> =
            page_trees.iter().map(|(page_number, tree)| PageTree { page_number: *page_number, tree }).collect();
        let (transcript, _transcript_ms) = build_transcript(&document.id, &page_refs);

        self.documents.set_stage(&document.id, ProcessingStage::PostProcessing).await?;
        self.fields.insert_batch(&extracted_fields).await?;
        self.transcripts.create(&transcript).await?;

        let total_fields = extracted_fields.len() as i32;
        let needs_review: Vec<&ExtractedField> = extracted_fields.iter().filter(|f| f.needs_manual_review).collect();
        let fields_review = needs_review.len() as i32;
        let average_confidence = if extracted_fields.is_empty() {
            None
        } else {
            Some(extracted_fields.iter().map(|f| f.confidence).sum::<f64>() / extracted_fields.len() as f64)
        };

        for field in &needs_review {
            let item = ReviewQueueItem::new(
                job.id.clone(),
                document.id.clone(),
                Some(field.id.clone()),
                format!("low-confidence field `{}` ({:.2})", field.field_name, field.confidence),
                None,
                None,
                job.priority,
            );
            self.review_queue.create(&item).await?;
        }

        let final_status = if fields_review > 0 { DocumentStatus::NeedsReview } else { DocumentStatus::Completed };
        let extraction_ms = start.elapsed().as_millis() as i64;
        let usage_json = serde_json::to_string(&serde_json::json!({
            "prompt_tokens": usage.prompt_tokens,
            "completion_tokens": usage.completion_tokens,
            "total_tokens": usage.total(),
        }))
        .ok();
        let cost_estimate = (usage.prompt_tokens as f64 / 1000.0) * self.llm_config.input_cost_per_1k_tokens
            + (usage.completion_tokens as f64 / 1000.0) * self.llm_config.output_cost_per_1k_tokens;
        self.documents
            .complete_with_telemetry(
                &document.id,
                final_status,
                total_fields,
                fields_review,
                average_confidence,
                extraction_ms,
                usage_json,
                Some(cost_estimate),
            )
            .await?;
        self.jobs.increment_processed(&job.id, false).await?;

        let refreshed_job = self.jobs.get(&job.id).await?;
        self.lifecycle.maybe_complete_job(&refreshed_job).await?;

        let event = JobEvent::DocumentCompleted {
            job_id: job.id.clone(),
            document_id: document.id.clone(),
            total_fields,
            fields_needing_review: fields_review,
        };
        let _ = self.events.publish(event).await;
        Ok(())
    }

    /// Dispatch all page batches concurrently (§4.E step 7). Bank
    /// statements gate the first batch sequentially so its
    /// `_table_headers` can be carried forward to the rest. Returns the
    /// per-batch responses plus the summed token usage across every call.
    async fn dispatch_batches(
        &self,
        document_type: Option<&str>,
        batches: &[PageBatch],
    ) -> Result<(Vec<(i32, Value)>, TokenUsage)> {
        if document_type == Some("bank_statement") {
            self.dispatch_bank_statement_batches(batches).await
        } else {
            self.dispatch_generic_batches(document_type, batches).await
        }
    }

    async fn dispatch_generic_batches(
        &self,
        document_type: Option<&str>,
        batches: &[PageBatch],
    ) -> Result<(Vec<(i32, Value)>, TokenUsage)> {
        let calls = batches.iter().map(|batch| async move {
            let task = ExtractionTask::GenericExtraction;
            let prompt = build_prompt(&task, ContentType::Image, document_type);
            let response = self
                .vision
                .extract(VisionRequest {
                    system_prompt: &prompt.system_prompt,
                    user_prompt: &prompt.user_prompt,
                    schema: &prompt.schema,
                    images: &batch.images,
                })
                .await?;
            Ok((batch.start_page, response.data, response.usage))
        });
        let results = join_all(calls)
            .await
            .into_iter()
            .collect::<std::result::Result<Vec<(i32, Value, TokenUsage)>, crate::llm::VisionError>>()
            .map_err(AppError::from)?;

        let mut usage = TokenUsage::default();
        let mut responses = Vec::with_capacity(results.len());
        for (start_page, data, batch_usage) in results {
            usage.add(batch_usage);
            responses.push((start_page, data));
        }
        Ok((responses, usage))
    }

    async fn dispatch_bank_statement_batches(&self, batches: &[PageBatch]) -> Result<(Vec<(i32, Value)>, TokenUsage)> {
        let Some((first, rest)) = batches.split_first() else {
            return Ok((Vec::new(), TokenUsage::default()));
        };

        let first_prompt = build_prompt(&ExtractionTask::BankStatement { continuation: None }, ContentType::Image, Some("bank_statement"));
        let first_response = self
            .vision
            .extract(VisionRequest {
                system_prompt: &first_prompt.system_prompt,
                user_prompt: &first_prompt.user_prompt,
                schema: &first_prompt.schema,
                images: &first.images,
            })
            .await
            .map_err(AppError::from)?;

        let mut usage = TokenUsage::default();
        usage.add(first_response.usage);

        let table_headers: Option<Vec<String>> = first_response
            .data
            .get("_table_headers")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect());

        let mut results = vec![(first.start_page, first_response.data)];

        let calls = rest.iter().map(|batch| {
            let headers = table_headers.clone();
            async move {
                let task = match headers {
                    Some(table_headers) => ExtractionTask::BankStatement {
                        continuation: Some(BankStatementContinuation { page_number: batch.start_page, table_headers }),
                    },
                    None => ExtractionTask::GenericExtraction,
                };
                let prompt = build_prompt(&task, ContentType::Image, Some("bank_statement"));
                let response = self
                    .vision
                    .extract(VisionRequest {
                        system_prompt: &prompt.system_prompt,
                        user_prompt: &prompt.user_prompt,
                        schema: &prompt.schema,
                        images: &batch.images,
                    })
                    .await?;
                Ok((batch.start_page, response.data, response.usage))
            }
        });
        let continuation_results: Vec<std::result::Result<(i32, Value, TokenUsage), crate::llm::VisionError>> =
            join_all(calls).await;
        for result in continuation_results {
            let (start_page, data, batch_usage) = result.map_err(AppError::from)?;
            usage.add(batch_usage);
            results.push((start_page, data));
        }
        Ok((results, usage))
    }

    /// Normalize every batch response into `ExtractedField` rows (step 8-9)
    /// and a `Node` tree per page for the transcript builder (step 10). A
    /// batch's fields are attributed to the page an explicit `page` key
    /// names, falling back to the batch's starting page when the model
    /// doesn't say (see DESIGN.md's open question on multi-page batch
    /// attribution).
    fn build_fields(
        &self,
        job: &Job,
        document: &Document,
        responses: &[(i32, Value)],
    ) -> (Vec<ExtractedField>, Vec<(i32, crate::models::Node)>) {
        let mut fields = Vec::new();
        let mut by_page: HashMap<i32, Vec<(String, Value)>> = HashMap::new();
        let mut order_by_page: HashMap<i32, i32> = HashMap::new();

        for (start_page, data) in responses {
            for parsed in flatten_response(data) {
                let page_number = parsed.page.unwrap_or(*start_page);
                let order = order_by_page.entry(page_number).or_insert(0);
                let needs_review = parsed.flagged || parsed.confidence < self.llm_config.review_threshold;

                let field = ExtractedField::new(
                    job.id.clone(),
                    document.id.clone(),
                    parsed.path.clone(),
                    parsed.label.clone(),
                    field_type_str(&parsed.value).to_string(),
                    &parsed.value,
                    parsed.section_name.clone(),
                    Some(page_number),
                    *order,
                    parsed.confidence,
                    needs_review,
                    parsed.section_name.clone(),
                    parsed.source_location.clone(),
                    parsed.extraction_context.clone(),
                );
                *order += 1;

                by_page.entry(page_number).or_default().push((parsed.path, parsed.value));
                fields.push(field);
            }
        }

        let mut page_trees: Vec<(i32, crate::models::Node)> = by_page
            .into_iter()
            .map(|(page_number, entries)| {
                let refs: Vec<(&str, &Value)> = entries.iter().map(|(path, value)| (path.as_str(), value)).collect();
                (page_number, build_page_tree(&refs))
            })
            .collect();
        page_trees.sort_by_key(|(page_number, _)| *page_number);

        (fields, page_trees)
    }

    async fn fail_document(&self, document: &Document, job: &Job, err: &AppError) -> Result<()> {
        let error_type = match err {
            AppError::Transient(_) => "transient",
            AppError::Permanent(_) => "permanent",
            AppError::IntegrityFault(_) => "integrity_fault",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::NotFound(_) => "not_found",
            AppError::IllegalTransition(_) => "illegal_transition",
        };

        let exhausted = document.retry_count >= document.max_retries;
        if err.is_retryable() && !exhausted {
            self.documents.retry(&document.id).await?;
            return Ok(());
        }

        self.documents.set_error(&document.id, &err.to_string(), error_type).await?;
        self.jobs.increment_processed(&job.id, true).await?;
        let refreshed_job = self.jobs.get(&job.id).await?;
        self.lifecycle.maybe_complete_job(&refreshed_job).await?;

        let _ = self
            .events
            .publish(JobEvent::DocumentFailed {
                job_id: job.id.clone(),
                document_id: document.id.clone(),
                error: err.to_string(),
            })
            .await;
        Ok(())
    }
}

/// Dispatch target for the broker's `extract_document` task type. Payload:
/// `{"document_id": "..."}`.
#[async_trait]
impl TaskHandler for ExtractionWorker {
    async fn handle(&self, payload: Value) -> Result<()> {
        let document_id = payload
            .get("document_id")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::InvalidInput("extract_document task missing document_id".to_string()))?;
        self.process_document(document_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(number: i32) -> RasterPage {
        RasterPage { page_number: number, png_bytes: vec![0x89, b'P', b'N', b'G'] }
    }

    #[test]
    fn forms_contiguous_batches_of_the_configured_size() {
        let pages = vec![page(1), page(2), page(3), page(4), page(5), page(6)];
        let batches = form_batches(&pages, 5);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].start_page, 1);
        assert_eq!(batches[0].images.len(), 5);
        assert_eq!(batches[1].start_page, 6);
        assert_eq!(batches[1].images.len(), 1);
    }

    #[test]
    fn single_page_document_forms_one_batch() {
        let pages = vec![page(1)];
        let batches = form_batches(&pages, 5);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].start_page, 1);
    }
}

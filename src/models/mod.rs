//! Data models for the bulk document-extraction orchestrator.

pub mod document;
pub mod extracted_field;
pub mod job;
pub mod node;
pub mod review_queue;
pub mod template;
pub mod transcript;

pub use document::{Document, DocumentStatus, ProcessingStage};
pub use extracted_field::{ExtractedField, ValidationStatus};
pub use job::{clamp_priority, Job, JobStatus, SourceKind, MAX_PRIORITY, MIN_PRIORITY};
pub use node::{LeafKind, Node};
pub use review_queue::{ReviewQueueItem, ReviewStatus};
pub use template::MappingTemplate;
pub use transcript::{DocumentTranscript, TranscriptIndexEntry};

//! Extraction worker (component E): the per-document pipeline from claimed
//! bytes to a terminal status, fields, and a transcript.
//!
//! Grounded on the teacher's overall worker-loop shape (claim, fetch,
//! persist, mark done) generalized from crawling a URL to extracting a
//! document, composed with
//! `original_source/backend-bulk/app/services/transcript_service.py`'s
//! (informed) transcript pass and `fields_service.py`'s (informed) granular
//! field persistence. See spec §4.E's 13-step sequence.

pub mod parse;
pub mod worker;

pub use worker::ExtractionWorker;

//! Job/document lifecycle manager (component G): enforces the legal
//! transition set for jobs and documents, cascades job-level terminal
//! transitions once every document has reached a terminal state, and
//! reconciles stuck work.
//!
//! Grounded on `repository/crawl/state.rs`'s aggregate counting queries,
//! generalized here from crawl source status to job/document status.

pub mod jobs;
pub mod reconciler;

pub use jobs::LifecycleManager;
pub use reconciler::Reconciler;

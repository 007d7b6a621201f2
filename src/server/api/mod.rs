//! HTTP handler modules, one per resource, matching spec's external
//! interfaces list (§6).

pub mod documents;
pub mod export;
pub mod helpers;
pub mod jobs;
pub mod review_queue;
pub mod templates;
pub mod upload;
pub mod ws;

//! Discovery worker (component F): turns an upload session into the job's
//! `Document` rows and hands them to the broker for extraction.
//!
//! Generalized from the teacher's web-source discovery (search engines,
//! sitemaps, Wayback Machine crawling) to walking an upload-session
//! manifest instead of the open web.

pub mod worker;

pub use worker::{DiscoveryError, DiscoveryMode, DiscoveryWorker};

//! Bulk document-extraction orchestrator: turns an uploaded batch of
//! documents into structured, reviewable field data.
//!
//! The pipeline runs in three stages wired together by the task broker:
//! discovery (component F) turns an upload session into `Document` rows,
//! the extraction worker (component E) rasterizes each page and calls a
//! vision-LLM to fill a document-type's field schema, and the template
//! engine (component K) resolves those fields against a `MappingTemplate`
//! for export. The HTTP server and CLI are two front ends onto the same
//! repository/lifecycle/broker core.

pub mod broker;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod extraction;
pub mod lifecycle;
pub mod llm;
pub mod models;
pub mod raster;
pub mod repository;
pub mod schema;
pub mod server;
pub mod storage;
pub mod template;
pub mod transcript;

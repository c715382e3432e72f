//! pcr-ingest library interface
//!
//! Resolves postal codes against the upstream lookup service and persists the
//! resulting address records to a relational table, a document collection,
//! and snapshot files. [`Pipeline`] is the entry point for one run.

pub mod config;
pub mod db;
pub mod error;
pub mod input;
pub mod models;
pub mod pipeline;
pub mod services;

pub use crate::config::{ArtifactPaths, IngestConfig};
pub use crate::error::{FailureKind, FetchError, QueueError};
pub use crate::models::RunSummary;
pub use crate::pipeline::Pipeline;

//! Data models for pcr-ingest
//!
//! Address and error records live in `pcr_common::models`; this module holds
//! the pipeline-only types.

pub mod statistics;

pub use statistics::{
    DocumentCounters, DocumentStats, RelationalCounters, RelationalStats, RunSummary,
};

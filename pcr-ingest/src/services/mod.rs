//! Pipeline components
//!
//! - [`rate_limiter`]: global minimum-interval gate for outbound requests
//! - [`backoff`]: retry delay policy
//! - [`lookup_client`]: upstream lookup handle and failure classification
//! - [`fetch_orchestrator`]: worker pool and retry loop
//! - [`relational_writer`]: single-consumer relational queue
//! - [`document_writer`]: inline document upserts
//! - [`error_sink`]: terminal failure capture
//! - [`checkpoint`]: snapshot artifacts

pub mod backoff;
pub mod checkpoint;
pub mod document_writer;
pub mod error_sink;
pub mod fetch_orchestrator;
pub mod lookup_client;
pub mod rate_limiter;
pub mod relational_writer;

pub use backoff::BackoffPolicy;
pub use checkpoint::{CheckpointSummary, Checkpointer};
pub use document_writer::DocumentWriter;
pub use error_sink::{ErrorBackend, ErrorSink};
pub use fetch_orchestrator::{FetchTotals, RunContext};
pub use lookup_client::{
    AddressLookup, HttpLookupClient, HttpLookupFactory, LookupFactory, Transport,
};
pub use rate_limiter::RateLimiter;
pub use relational_writer::{QueueItem, RelationalQueue, RelationalWriter, WriterMessage};

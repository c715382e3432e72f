//! Error types for pcr-ingest
//!
//! Every failure on the lookup path is one [`FetchError`] variant, and every
//! variant maps to exactly one [`FailureKind`]. The orchestrator matches on the
//! kind to choose between retry, insecure fallback and terminal failure.

use std::time::Duration;
use thiserror::Error;

/// Upstream lookup failure
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Upstream reported the code as invalid or unknown (`erro` marker)
    #[error("postal code invalid or not found")]
    NotFound,

    /// Connect or read timeout
    #[error("timeout: {0}")]
    Timeout(String),

    /// Connection refused or reset
    #[error("connection error: {0}")]
    Connection(String),

    /// Response body ended early or could not be read
    #[error("truncated response: {0}")]
    Truncated(String),

    /// TLS handshake or certificate failure
    #[error("secure transport error: {0}")]
    SecureTransport(String),

    /// Non-success HTTP status
    #[error("HTTP {status}")]
    Status {
        status: u16,
        retry_after: Option<String>,
        retryable: bool,
    },

    /// Body was not the expected JSON document
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Anything else
    #[error("{0}")]
    Unclassified(String),
}

/// Failure classes driving the retry decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Terminal immediately
    NotFound,
    /// Timeout, reset, truncated body: retried with backoff
    TransientNetwork,
    /// Retried with backoff, then one insecure fallback if enabled
    SecureTransport,
    /// Designated status codes: retried, honoring the server retry hint
    ServerStatus,
    /// Retried like transient failures
    MalformedBody,
    /// Terminal immediately
    Unclassified,
}

impl FailureKind {
    /// Whether the retry loop may try again for this kind
    pub fn is_retryable(self) -> bool {
        match self {
            FailureKind::TransientNetwork
            | FailureKind::SecureTransport
            | FailureKind::ServerStatus
            | FailureKind::MalformedBody => true,
            FailureKind::NotFound | FailureKind::Unclassified => false,
        }
    }

    /// Short tag carried by retry and terminal-failure trace events
    pub fn tag(self) -> &'static str {
        match self {
            FailureKind::NotFound => "NOT-FOUND",
            FailureKind::TransientNetwork => "NETWORK",
            FailureKind::SecureTransport => "TLS",
            FailureKind::ServerStatus => "HTTP",
            FailureKind::MalformedBody => "BODY",
            FailureKind::Unclassified => "UNK",
        }
    }
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::NotFound => FailureKind::NotFound,
            FetchError::Timeout(_) | FetchError::Connection(_) | FetchError::Truncated(_) => {
                FailureKind::TransientNetwork
            }
            FetchError::SecureTransport(_) => FailureKind::SecureTransport,
            FetchError::Status { retryable: true, .. } => FailureKind::ServerStatus,
            FetchError::Status { retryable: false, .. } => FailureKind::Unclassified,
            FetchError::Malformed(_) => FailureKind::MalformedBody,
            FetchError::Unclassified(_) => FailureKind::Unclassified,
        }
    }

    /// Raw server retry hint, if the failure carried one
    pub fn retry_hint(&self) -> Option<&str> {
        match self {
            FetchError::Status { retry_after, .. } => retry_after.as_deref(),
            _ => None,
        }
    }
}

/// Relational queue enqueue failure
#[derive(Debug, Error)]
pub enum QueueError {
    /// Queue stayed at capacity for the whole enqueue timeout
    #[error("relational queue full after {0:?}")]
    Full(Duration),

    /// Writer is gone
    #[error("relational queue closed")]
    Closed,
}

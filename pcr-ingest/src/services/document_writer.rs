//! Document-store writer
//!
//! Called inline by the worker that resolved a record; there is no queue. The
//! store is probed once at startup and a failed probe disables the sink for
//! the whole run, after which every upsert is a no-op.

use crate::db::{DocumentStore, UpsertOutcome};
use crate::models::{DocumentCounters, DocumentStats};
use crate::services::error_sink::ErrorSink;
use pcr_common::AddressRecord;
use std::sync::Arc;
use tracing::{info, warn};

pub struct DocumentWriter {
    store: Option<Arc<dyn DocumentStore>>,
    counters: DocumentCounters,
    errors: Arc<ErrorSink>,
}

impl DocumentWriter {
    /// Writer whose sink is off for the run
    pub fn disabled(errors: Arc<ErrorSink>) -> Self {
        Self {
            store: None,
            counters: DocumentCounters::default(),
            errors,
        }
    }

    /// Probe `store` and keep it only if the probe succeeds
    pub async fn probe(store: Arc<dyn DocumentStore>, errors: Arc<ErrorSink>) -> Self {
        match store.ping().await {
            Ok(()) => {
                info!("Document store connected");
                Self {
                    store: Some(store),
                    counters: DocumentCounters::default(),
                    errors,
                }
            }
            Err(e) => {
                warn!(error = %e, "Document store unavailable, sink disabled for this run");
                errors.record("", format!("document connect: {}", e));
                Self::disabled(errors)
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Upsert `record` by code. Failures are recorded and swallowed.
    pub async fn upsert(&self, record: &AddressRecord) -> Option<UpsertOutcome> {
        let store = self.store.as_ref()?;

        match store.upsert(record).await {
            Ok(outcome) => {
                match outcome {
                    UpsertOutcome::Upserted => self.counters.record_upserted(),
                    UpsertOutcome::Updated => self.counters.record_updated(),
                }
                Some(outcome)
            }
            Err(e) => {
                self.counters.record_errored();
                self.errors.record(&record.code, format!("document: {}", e));
                None
            }
        }
    }

    /// Counter snapshot, `None` when disabled
    pub fn stats(&self) -> Option<DocumentStats> {
        self.store.as_ref().map(|_| self.counters.snapshot())
    }
}

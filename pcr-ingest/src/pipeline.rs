//! Pipeline run
//!
//! Wires the components for one run and enforces the shutdown order:
//! workers finish, the relational writer drains and joins, then the final
//! checkpoint is written and the summary produced. Store probes run before
//! any lookup; a failed probe disables that sink for the run.

use crate::config::IngestConfig;
use crate::db::{DocumentStore, RelationalStore, SqliteAddressStore, SqliteDocumentStore};
use crate::models::{RelationalCounters, RunSummary};
use crate::services::{
    Checkpointer, DocumentWriter, ErrorSink, HttpLookupFactory, LookupFactory, RelationalWriter,
    RunContext,
};
use pcr_common::config::ensure_directory;
use pcr_common::{normalize_codes, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// One configured resolution run
pub struct Pipeline {
    config: IngestConfig,
    output_dir: PathBuf,
    lookup: Arc<dyn LookupFactory>,
    relational: Option<Arc<dyn RelationalStore>>,
    document: Option<Arc<dyn DocumentStore>>,
}

impl Pipeline {
    /// Pipeline using the HTTP lookup client and the stores named in `config`
    pub fn new(config: IngestConfig, output_dir: impl Into<PathBuf>) -> Self {
        let lookup = Arc::new(HttpLookupFactory::new(config.clone()));
        Self {
            config,
            output_dir: output_dir.into(),
            lookup,
            relational: None,
            document: None,
        }
    }

    pub fn with_lookup_factory(mut self, lookup: Arc<dyn LookupFactory>) -> Self {
        self.lookup = lookup;
        self
    }

    /// Use `store` instead of connecting to `relational_url`
    pub fn with_relational_store(mut self, store: Arc<dyn RelationalStore>) -> Self {
        self.relational = Some(store);
        self
    }

    /// Use `store` instead of connecting to `document_url`
    pub fn with_document_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.document = Some(store);
        self
    }

    /// Resolve every valid code in `candidates` and persist the results
    pub async fn run<I, S>(self, candidates: I) -> Result<RunSummary>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let started = Instant::now();
        self.config.validate()?;
        ensure_directory(&self.output_dir)?;

        let paths = self.config.artifact_paths(&self.output_dir);
        let errors = Arc::new(ErrorSink::open(&paths.errors_log, &paths.errors_csv)?);

        let codes = normalize_codes(candidates);
        info!(
            codes = codes.len(),
            workers = self.config.workers,
            rate_per_sec = self.config.rate_per_sec,
            output_dir = %self.output_dir.display(),
            "Unique valid postal codes loaded"
        );

        let relational_counters = Arc::new(RelationalCounters::default());
        let relational_store = self.open_relational(&errors).await;
        let writer = relational_store.clone().map(|store| {
            RelationalWriter::spawn(
                store,
                self.config.queue_capacity,
                errors.clone(),
                relational_counters.clone(),
            )
        });
        if writer.is_none() {
            info!("Relational sink off, writing artifacts and documents only");
        }

        let documents = match self.open_document(&errors).await {
            Some(store) => DocumentWriter::probe(store, errors.clone()).await,
            None => DocumentWriter::disabled(errors.clone()),
        };

        let ctx = Arc::new(RunContext::new(
            &self.config,
            Checkpointer::new(paths, self.config.checkpoint_every),
            errors.clone(),
            writer.as_ref().map(RelationalWriter::queue),
            relational_counters.clone(),
            documents,
        )?);

        let totals = ctx
            .run_workers(self.lookup.as_ref(), codes, self.config.workers)
            .await;

        if let Some(writer) = writer {
            writer.finish().await;
        }

        let checkpoint = ctx.final_checkpoint().await?;

        let relational_rows = match &relational_store {
            Some(store) => match store.count().await {
                Ok(rows) => Some(rows),
                Err(e) => {
                    warn!(error = %e, "Relational row count failed");
                    None
                }
            },
            None => None,
        };

        let summary = RunSummary {
            total: totals.total,
            succeeded: totals.succeeded,
            failed: totals.failed,
            relational: relational_store
                .as_ref()
                .map(|_| relational_counters.snapshot()),
            relational_rows,
            document: ctx.documents().stats(),
            errors_recorded: errors.len(),
            checkpointed_records: checkpoint.records,
            elapsed: started.elapsed(),
        };
        log_summary(&summary);

        Ok(summary)
    }

    async fn open_relational(&self, errors: &ErrorSink) -> Option<Arc<dyn RelationalStore>> {
        let store: Arc<dyn RelationalStore> = match &self.relational {
            Some(store) => store.clone(),
            None if self.config.relational_url.trim().is_empty() => return None,
            None => match SqliteAddressStore::connect(&self.config.relational_url).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    warn!(error = %e, "Relational store unavailable");
                    errors.record("", format!("relational connect: {}", e));
                    return None;
                }
            },
        };

        match store.probe().await {
            Ok(rows) => {
                info!(rows, "Relational store connected");
                Some(store)
            }
            Err(e) => {
                warn!(error = %e, "Relational store unavailable");
                errors.record("", format!("relational connect: {}", e));
                None
            }
        }
    }

    async fn open_document(&self, errors: &ErrorSink) -> Option<Arc<dyn DocumentStore>> {
        if let Some(store) = &self.document {
            return Some(store.clone());
        }
        if self.config.document_url.trim().is_empty() {
            info!("Document store not configured, document sink disabled");
            return None;
        }

        let max_connections = u32::try_from(self.config.workers).unwrap_or(u32::MAX);
        match SqliteDocumentStore::connect(&self.config.document_url, max_connections).await {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                warn!(error = %e, "Document store unavailable");
                errors.record("", format!("document connect: {}", e));
                None
            }
        }
    }
}

fn log_summary(summary: &RunSummary) {
    info!(
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        errors = summary.errors_recorded,
        checkpointed = summary.checkpointed_records,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "Run complete"
    );

    match (&summary.relational, summary.relational_rows) {
        (Some(stats), Some(rows)) => info!(rows, "Relational: {}", stats.display_string()),
        (Some(stats), None) => info!("Relational: {}", stats.display_string()),
        (None, _) => info!("Relational: off"),
    }

    match &summary.document {
        Some(stats) => info!("Document: {}", stats.display_string()),
        None => info!("Document: off"),
    }
}

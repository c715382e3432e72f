//! Fetch orchestrator
//!
//! A fixed pool of worker tasks shares one queue of normalized codes. Each
//! worker owns the lookup handle built for it at startup and, per code:
//! waits on the global rate limiter, issues the lookup, retries retryable
//! failures with backoff, and on success hands the record to both sinks and
//! the in-memory result list. Terminal failures go to the error sink. No
//! single task's failure stops the run: a worker that panics has its
//! in-flight code recorded as failed and is replaced while codes remain.
//!
//! All run-scoped state lives in [`RunContext`], shared by `Arc`.

use crate::config::IngestConfig;
use crate::error::{FailureKind, QueueError};
use crate::models::RelationalCounters;
use crate::services::backoff::BackoffPolicy;
use crate::services::checkpoint::{CheckpointSummary, Checkpointer};
use crate::services::document_writer::DocumentWriter;
use crate::services::error_sink::ErrorSink;
use crate::services::lookup_client::{AddressLookup, LookupFactory, Transport};
use crate::services::rate_limiter::RateLimiter;
use crate::services::relational_writer::RelationalQueue;
use pcr_common::{AddressRecord, Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Task completion counters
#[derive(Debug, Default)]
struct Progress {
    processed: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

/// Outcome counts after all workers finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTotals {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Everything one pipeline run shares between its workers
pub struct RunContext {
    pub run_id: Uuid,
    limiter: RateLimiter,
    backoff: BackoffPolicy,
    insecure_fallback: bool,
    enqueue_timeout: Duration,
    stats_every: usize,
    results: Arc<Mutex<Vec<AddressRecord>>>,
    errors: Arc<ErrorSink>,
    checkpointer: Arc<Checkpointer>,
    relational: Option<RelationalQueue>,
    relational_counters: Arc<RelationalCounters>,
    documents: DocumentWriter,
    progress: Progress,
}

impl RunContext {
    pub fn new(
        config: &IngestConfig,
        checkpointer: Checkpointer,
        errors: Arc<ErrorSink>,
        relational: Option<RelationalQueue>,
        relational_counters: Arc<RelationalCounters>,
        documents: DocumentWriter,
    ) -> Result<Self> {
        Ok(Self {
            run_id: Uuid::new_v4(),
            limiter: RateLimiter::new(config.rate_per_sec)?,
            backoff: BackoffPolicy::new(
                config.backoff_base(),
                config.backoff_cap(),
                config.max_attempts,
            ),
            insecure_fallback: config.insecure_fallback,
            enqueue_timeout: config.enqueue_timeout(),
            stats_every: config.stats_every,
            results: Arc::new(Mutex::new(Vec::new())),
            errors,
            checkpointer: Arc::new(checkpointer),
            relational,
            relational_counters,
            documents,
            progress: Progress::default(),
        })
    }

    pub fn errors(&self) -> &Arc<ErrorSink> {
        &self.errors
    }

    pub fn documents(&self) -> &DocumentWriter {
        &self.documents
    }

    pub fn relational_enabled(&self) -> bool {
        self.relational.is_some()
    }

    /// Copy of the records resolved so far
    pub fn results(&self) -> Vec<AddressRecord> {
        self.results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Unconditional checkpoint at run end
    pub async fn final_checkpoint(&self) -> Result<CheckpointSummary> {
        self.write_checkpoint(true).await
    }

    /// Snapshot artifacts on the blocking pool
    async fn write_checkpoint(&self, last: bool) -> Result<CheckpointSummary> {
        let checkpointer = Arc::clone(&self.checkpointer);
        let results = Arc::clone(&self.results);
        let errors = Arc::clone(&self.errors);

        tokio::task::spawn_blocking(move || {
            if last {
                checkpointer.finish(&results, &errors)
            } else {
                checkpointer.checkpoint(&results, &errors)
            }
        })
        .await
        .map_err(|e| Error::Internal(format!("checkpoint task: {}", e)))?
    }

    /// Run one worker per lookup handle until the code queue is empty.
    ///
    /// Lookup handles that cannot be built are recorded as failures; codes no
    /// worker could take are recorded individually.
    pub async fn run_workers(
        self: &Arc<Self>,
        factory: &dyn LookupFactory,
        codes: Vec<String>,
        workers: usize,
    ) -> FetchTotals {
        let total = codes.len();
        let pool_size = workers.min(total);

        let clients: Vec<_> = (0..pool_size)
            .filter_map(|_| self.build_client(factory))
            .collect();

        info!(
            run_id = %self.run_id,
            codes = total,
            workers = clients.len(),
            interval_ms = self.limiter.interval().as_millis() as u64,
            "Starting lookup workers"
        );

        let queue = Arc::new(Mutex::new(VecDeque::from(codes)));
        let mut tasks = JoinSet::new();
        let mut next_worker_id = 0;
        for client in clients {
            self.spawn_worker(&mut tasks, next_worker_id, client, &queue);
            next_worker_id += 1;
        }

        while let Some(joined) = tasks.join_next().await {
            let Err(e) = joined else { continue };
            warn!(run_id = %self.run_id, error = %e, "Lookup worker aborted");

            if queue_len(&queue) > 0 {
                if let Some(client) = self.build_client(factory) {
                    info!(worker_id = next_worker_id, "Replacing aborted lookup worker");
                    self.spawn_worker(&mut tasks, next_worker_id, client, &queue);
                    next_worker_id += 1;
                }
            }
        }

        let stranded = std::mem::take(&mut *lock_queue(&queue));
        for code in stranded {
            self.abandon(&code, "no lookup worker available");
        }

        let totals = FetchTotals {
            total,
            succeeded: self.progress.succeeded.load(Ordering::Relaxed),
            failed: self.progress.failed.load(Ordering::Relaxed),
        };
        info!(
            run_id = %self.run_id,
            total = totals.total,
            succeeded = totals.succeeded,
            failed = totals.failed,
            "Lookup workers finished"
        );
        totals
    }

    fn build_client(&self, factory: &dyn LookupFactory) -> Option<Box<dyn AddressLookup>> {
        match factory.build() {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(run_id = %self.run_id, error = %e, "Lookup client unavailable");
                self.errors.record("", format!("lookup client: {}", e));
                None
            }
        }
    }

    fn spawn_worker(
        self: &Arc<Self>,
        tasks: &mut JoinSet<()>,
        worker_id: usize,
        client: Box<dyn AddressLookup>,
        queue: &Arc<Mutex<VecDeque<String>>>,
    ) {
        let ctx = Arc::clone(self);
        let queue = Arc::clone(queue);
        tasks.spawn(async move { ctx.work(worker_id, client, queue).await });
    }

    /// Count `code` as failed without a lookup outcome
    fn abandon(&self, code: &str, reason: &str) {
        self.errors.record(code, reason);
        self.progress.failed.fetch_add(1, Ordering::Relaxed);
        self.progress.processed.fetch_add(1, Ordering::Relaxed);
    }

    async fn work(
        &self,
        worker_id: usize,
        client: Box<dyn AddressLookup>,
        queue: Arc<Mutex<VecDeque<String>>>,
    ) {
        debug!(worker_id, "Lookup worker started");

        loop {
            let next = lock_queue(&queue).pop_front();
            let Some(code) = next else { break };

            let in_flight = InFlight { ctx: self, code: Some(code) };
            let code = in_flight.code();
            let resolved = match self.resolve(client.as_ref(), code).await {
                Some(record) => {
                    self.accept(record).await;
                    true
                }
                None => false,
            };
            in_flight.settle();
            self.complete(resolved).await;
        }

        debug!(worker_id, "Lookup worker finished");
    }

    /// Retry loop for one code. Terminal failures are recorded here.
    pub async fn resolve(&self, client: &dyn AddressLookup, code: &str) -> Option<AddressRecord> {
        let max_attempts = self.backoff.max_attempts();
        let mut attempt = 1;

        loop {
            self.limiter.wait().await;

            let err = match client.lookup(code, Transport::Secure).await {
                Ok(record) => return Some(record),
                Err(err) => err,
            };

            let kind = err.kind();
            if kind.is_retryable() && attempt < max_attempts {
                let delay = self.backoff.wait_duration(attempt, err.retry_hint());
                debug!(
                    code = %code,
                    attempt,
                    kind = kind.tag(),
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Lookup failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            if kind == FailureKind::SecureTransport && self.insecure_fallback {
                return self.insecure_fallback(client, code).await;
            }

            debug!(code = %code, attempt, kind = kind.tag(), "Lookup failed terminally");
            self.errors.record(code, err.to_string());
            return None;
        }
    }

    /// One plain-transport attempt after secure transport gave up
    async fn insecure_fallback(&self, client: &dyn AddressLookup, code: &str) -> Option<AddressRecord> {
        warn!(code = %code, "Secure transport exhausted, trying insecure fallback");
        self.limiter.wait().await;

        match client.lookup(code, Transport::Insecure).await {
            Ok(record) => Some(record),
            Err(err) => {
                self.errors.record(code, format!("insecure fallback: {}", err));
                None
            }
        }
    }

    /// Hand a resolved record to both sinks and the result list.
    ///
    /// A full relational queue drops the record for that sink only.
    pub async fn accept(&self, record: AddressRecord) {
        if let Some(queue) = &self.relational {
            if let Err(e) = queue.enqueue(record.clone(), self.enqueue_timeout).await {
                if let QueueError::Closed = e {
                    warn!(code = %record.code, "Relational writer gone, record dropped");
                }
                self.relational_counters.record_dropped();
                self.errors.record(&record.code, e.to_string());
            }
        }

        self.documents.upsert(&record).await;

        self.results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record);
    }

    async fn complete(&self, resolved: bool) {
        if resolved {
            self.progress.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.progress.failed.fetch_add(1, Ordering::Relaxed);
        }
        let processed = self.progress.processed.fetch_add(1, Ordering::Relaxed) + 1;

        if self.stats_every > 0 && processed % self.stats_every == 0 {
            self.log_progress(processed);
        }

        if self.checkpointer.is_due(processed) {
            if let Err(e) = self.write_checkpoint(false).await {
                warn!(processed, error = %e, "Checkpoint failed");
            }
        }
    }

    fn log_progress(&self, processed: usize) {
        let ok = self.progress.succeeded.load(Ordering::Relaxed);
        let failed = self.progress.failed.load(Ordering::Relaxed);

        let relational = match &self.relational {
            Some(queue) => format!(
                "queue={} {}",
                queue.depth(),
                self.relational_counters.snapshot().display_string()
            ),
            None => "off".to_string(),
        };
        let document = match self.documents.stats() {
            Some(stats) => stats.display_string(),
            None => "off".to_string(),
        };

        info!(
            run_id = %self.run_id,
            processed,
            ok,
            failed,
            relational = %relational,
            document = %document,
            "Lookup progress"
        );
    }
}

/// The code a worker is resolving. Dropped unsettled, it is recorded as
/// failed; this covers a worker task that panicked mid-lookup.
struct InFlight<'a> {
    ctx: &'a RunContext,
    code: Option<String>,
}

impl InFlight<'_> {
    fn code(&self) -> &str {
        self.code.as_deref().unwrap_or_default()
    }

    fn settle(mut self) {
        self.code = None;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(code) = self.code.take() {
            self.ctx.abandon(&code, "lookup worker aborted");
        }
    }
}

fn lock_queue(queue: &Mutex<VecDeque<String>>) -> std::sync::MutexGuard<'_, VecDeque<String>> {
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn queue_len(queue: &Mutex<VecDeque<String>>) -> usize {
    lock_queue(queue).len()
}

//! Per-sink counters and run summary
//!
//! Counters are plain atomics mutated only by the component that owns the
//! sink; reporting reads a consistent-enough snapshot with relaxed loads.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Relational sink counters
#[derive(Debug, Default)]
pub struct RelationalCounters {
    inserted: AtomicU64,
    ignored: AtomicU64,
    errored: AtomicU64,
    dropped: AtomicU64,
}

impl RelationalCounters {
    pub fn record_inserted(&self) {
        self.inserted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_errored(&self) {
        self.errored.fetch_add(1, Ordering::Relaxed);
    }

    /// Queue saturation drop
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelationalStats {
        RelationalStats {
            inserted: self.inserted.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationalStats {
    pub inserted: u64,
    pub ignored: u64,
    pub errored: u64,
    pub dropped: u64,
}

impl RelationalStats {
    pub fn display_string(&self) -> String {
        format!(
            "ins={} ign={} err={} drop={}",
            self.inserted, self.ignored, self.errored, self.dropped
        )
    }
}

/// Document sink counters
#[derive(Debug, Default)]
pub struct DocumentCounters {
    upserted: AtomicU64,
    updated: AtomicU64,
    errored: AtomicU64,
}

impl DocumentCounters {
    pub fn record_upserted(&self) {
        self.upserted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_updated(&self) {
        self.updated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_errored(&self) {
        self.errored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DocumentStats {
        DocumentStats {
            upserted: self.upserted.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStats {
    pub upserted: u64,
    pub updated: u64,
    pub errored: u64,
}

impl DocumentStats {
    pub fn display_string(&self) -> String {
        format!(
            "up={} upd={} err={}",
            self.upserted, self.updated, self.errored
        )
    }
}

/// End-of-run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// `None` when the relational sink was disabled for the run
    pub relational: Option<RelationalStats>,
    /// Row count of the relational table after the writer finished
    pub relational_rows: Option<i64>,
    /// `None` when the document sink was disabled for the run
    pub document: Option<DocumentStats>,
    pub errors_recorded: u64,
    pub checkpointed_records: usize,
    pub elapsed: Duration,
}

//! Test Helper Utilities
//!
//! Scripted lookup clients and in-memory stores for driving the pipeline
//! without network or database access.

#![allow(dead_code)]

use async_trait::async_trait;
use pcr_common::{AddressRecord, Error, Result};
use pcr_ingest::db::{DocumentStore, RelationalStore, UpsertOutcome};
use pcr_ingest::services::{AddressLookup, LookupFactory, Transport};
use pcr_ingest::{FetchError, IngestConfig};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// Config with a fast limiter and the real backoff constants
pub fn test_config(workers: usize) -> IngestConfig {
    IngestConfig {
        workers,
        rate_per_sec: 100.0,
        relational_url: String::new(),
        document_url: String::new(),
        ..Default::default()
    }
}

pub fn address(code: &str) -> AddressRecord {
    AddressRecord {
        code: code.to_string(),
        street: format!("Rua {}", code),
        locality: "São Paulo".to_string(),
        state_code: "SP".to_string(),
        ..Default::default()
    }
}

/// One observed lookup call
#[derive(Debug, Clone)]
pub struct Call {
    pub code: String,
    pub transport: Transport,
    pub at: Instant,
}

#[derive(Default)]
struct Script {
    replies: Mutex<HashMap<String, VecDeque<std::result::Result<AddressRecord, FetchError>>>>,
    calls: Mutex<Vec<Call>>,
    panics: Mutex<HashSet<String>>,
    builds: AtomicUsize,
}

/// Lookup factory whose clients answer from a per-code script.
///
/// A code with no scripted replies left resolves to [`address`].
#[derive(Clone, Default)]
pub struct ScriptedLookups {
    script: Arc<Script>,
}

impl ScriptedLookups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(self, code: &str, error: FetchError) -> Self {
        self.push(code, Err(error));
        self
    }

    pub fn fail_times(self, code: &str, error: FetchError, times: usize) -> Self {
        for _ in 0..times {
            self.push(code, Err(error.clone()));
        }
        self
    }

    /// Client panics when asked for `code`
    pub fn panic_on(self, code: &str) -> Self {
        self.script.panics.lock().unwrap().insert(code.to_string());
        self
    }

    fn push(&self, code: &str, reply: std::result::Result<AddressRecord, FetchError>) {
        self.script
            .replies
            .lock()
            .unwrap()
            .entry(code.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, code: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.code == code).collect()
    }

    pub fn builds(&self) -> usize {
        self.script.builds.load(Ordering::SeqCst)
    }
}

impl LookupFactory for ScriptedLookups {
    fn build(&self) -> std::result::Result<Box<dyn AddressLookup>, FetchError> {
        self.script.builds.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedClient {
            script: self.script.clone(),
        }))
    }
}

struct ScriptedClient {
    script: Arc<Script>,
}

#[async_trait]
impl AddressLookup for ScriptedClient {
    async fn lookup(
        &self,
        code: &str,
        transport: Transport,
    ) -> std::result::Result<AddressRecord, FetchError> {
        self.script.calls.lock().unwrap().push(Call {
            code: code.to_string(),
            transport,
            at: Instant::now(),
        });

        let panics = self.script.panics.lock().unwrap().contains(code);
        if panics {
            panic!("scripted client panic on {}", code);
        }

        let reply = self
            .script
            .replies
            .lock()
            .unwrap()
            .get_mut(code)
            .and_then(VecDeque::pop_front);
        reply.unwrap_or_else(|| Ok(address(code)))
    }
}

/// In-memory relational store with an optional gate that stalls inserts
pub struct MemoryRelationalStore {
    rows: Mutex<HashSet<String>>,
    inserts: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
    probe_fails: bool,
}

impl MemoryRelationalStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(HashSet::new()),
            inserts: AtomicUsize::new(0),
            gate: None,
            probe_fails: false,
        })
    }

    /// Store whose inserts wait for a permit on the returned semaphore
    pub fn stalled() -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let store = Arc::new(Self {
            rows: Mutex::new(HashSet::new()),
            inserts: AtomicUsize::new(0),
            gate: Some(gate.clone()),
            probe_fails: false,
        });
        (store, gate)
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(HashSet::new()),
            inserts: AtomicUsize::new(0),
            gate: None,
            probe_fails: true,
        })
    }

    pub fn insert_calls(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.rows.lock().unwrap().contains(code)
    }
}

#[async_trait]
impl RelationalStore for MemoryRelationalStore {
    async fn probe(&self) -> Result<i64> {
        if self.probe_fails {
            return Err(Error::Internal("connection refused".to_string()));
        }
        self.count().await
    }

    async fn insert_ignore(&self, record: &AddressRecord) -> Result<bool> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| Error::Internal(e.to_string()))?
                .forget();
        }
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.lock().unwrap().insert(record.code.clone()))
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.rows.lock().unwrap().len() as i64)
    }
}

/// In-memory document store
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<HashMap<String, AddressRecord>>,
    upserts: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn get(&self, code: &str) -> Option<AddressRecord> {
        self.docs.lock().unwrap().get(code).cloned()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, record: &AddressRecord) -> Result<UpsertOutcome> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let previous = self
            .docs
            .lock()
            .unwrap()
            .insert(record.code.clone(), record.clone());
        Ok(match previous {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Upserted,
        })
    }
}

/// Read the JSON snapshot written to `dir`
pub fn read_json_snapshot(dir: &std::path::Path) -> Vec<AddressRecord> {
    let content = std::fs::read_to_string(dir.join("addresses.json")).unwrap();
    serde_json::from_str(&content).unwrap()
}

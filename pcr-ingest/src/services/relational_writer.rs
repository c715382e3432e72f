//! Single-consumer relational writer
//!
//! Workers hand resolved records to a bounded channel; one dedicated task
//! drains it and issues one idempotent insert per item, so statements against
//! the relational store are never concurrent. The writer stops on an explicit
//! [`WriterMessage::EndOfStream`], which is sent only after every producer has
//! finished and therefore sits behind every queued item.

use crate::db::RelationalStore;
use crate::error::QueueError;
use crate::models::RelationalCounters;
use crate::services::error_sink::ErrorSink;
use pcr_common::AddressRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One record handed to the relational writer
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub record: AddressRecord,
}

impl QueueItem {
    fn code(&self) -> &str {
        &self.record.code
    }
}

/// Channel message: a real item or the end-of-stream signal
#[derive(Debug)]
pub enum WriterMessage {
    Item(QueueItem),
    EndOfStream,
}

/// Producer side of the relational queue, cloned into every worker
#[derive(Clone)]
pub struct RelationalQueue {
    sender: mpsc::Sender<WriterMessage>,
}

impl RelationalQueue {
    /// Enqueue `record`, waiting at most `timeout` for free capacity.
    ///
    /// Ownership of the record moves into the queue on success.
    pub async fn enqueue(&self, record: AddressRecord, timeout: Duration) -> Result<(), QueueError> {
        match self
            .sender
            .send_timeout(WriterMessage::Item(QueueItem { record }), timeout)
            .await
        {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(QueueError::Full(timeout)),
            Err(SendTimeoutError::Closed(_)) => Err(QueueError::Closed),
        }
    }

    /// Items currently waiting in the channel
    pub fn depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }
}

/// Owner handle for the writer task
pub struct RelationalWriter {
    queue: RelationalQueue,
    handle: JoinHandle<u64>,
}

impl RelationalWriter {
    /// Spawn the writer task over a channel of `capacity` items
    pub fn spawn(
        store: Arc<dyn RelationalStore>,
        capacity: usize,
        errors: Arc<ErrorSink>,
        counters: Arc<RelationalCounters>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(drain(store, receiver, errors, counters));

        Self {
            queue: RelationalQueue { sender },
            handle,
        }
    }

    pub fn queue(&self) -> RelationalQueue {
        self.queue.clone()
    }

    /// Send the end-of-stream signal behind every queued item and wait for
    /// the writer to drain. Returns the number of items written or failed.
    pub async fn finish(self) -> u64 {
        let RelationalWriter { queue, handle } = self;

        if queue.sender.send(WriterMessage::EndOfStream).await.is_err() {
            warn!("Relational writer exited before end of stream");
        }
        drop(queue);

        match handle.await {
            Ok(processed) => {
                debug!(processed, "Relational writer joined");
                processed
            }
            Err(e) => {
                warn!(error = %e, "Relational writer task failed");
                0
            }
        }
    }
}

async fn drain(
    store: Arc<dyn RelationalStore>,
    mut receiver: mpsc::Receiver<WriterMessage>,
    errors: Arc<ErrorSink>,
    counters: Arc<RelationalCounters>,
) -> u64 {
    let mut processed = 0u64;

    while let Some(message) = receiver.recv().await {
        let item = match message {
            WriterMessage::Item(item) => item,
            WriterMessage::EndOfStream => break,
        };

        match store.insert_ignore(&item.record).await {
            Ok(true) => counters.record_inserted(),
            Ok(false) => counters.record_ignored(),
            Err(e) => {
                counters.record_errored();
                errors.record(item.code(), format!("relational: {}", e));
            }
        }
        processed += 1;
    }

    info!(
        processed,
        stats = %counters.snapshot().display_string(),
        "Relational writer drained"
    );
    processed
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// In-memory store; codes starting with "99" fail
    #[derive(Default)]
    struct MemoryStore {
        codes: Mutex<HashSet<String>>,
        order: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RelationalStore for MemoryStore {
        async fn probe(&self) -> pcr_common::Result<i64> {
            self.count().await
        }

        async fn insert_ignore(&self, record: &AddressRecord) -> pcr_common::Result<bool> {
            if record.code.starts_with("99") {
                return Err(pcr_common::Error::Internal("constraint failed".into()));
            }
            self.order.lock().unwrap().push(record.code.clone());
            Ok(self.codes.lock().unwrap().insert(record.code.clone()))
        }

        async fn count(&self) -> pcr_common::Result<i64> {
            Ok(self.codes.lock().unwrap().len() as i64)
        }
    }

    fn record(code: &str) -> AddressRecord {
        AddressRecord {
            code: code.to_string(),
            ..Default::default()
        }
    }

    fn sink(dir: &TempDir) -> Arc<ErrorSink> {
        Arc::new(
            ErrorSink::open(&dir.path().join("errors.log"), &dir.path().join("errors.csv"))
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_writer_counts_and_continues_after_failure() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let errors = sink(&dir);
        let counters = Arc::new(RelationalCounters::default());

        let writer = RelationalWriter::spawn(store.clone(), 8, errors.clone(), counters.clone());
        let queue = writer.queue();
        let timeout = Duration::from_secs(1);

        for code in ["01001000", "99000000", "01001000", "20040020"] {
            queue.enqueue(record(code), timeout).await.unwrap();
        }
        drop(queue);

        assert_eq!(writer.finish().await, 4);

        let stats = counters.snapshot();
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.ignored, 1);
        assert_eq!(stats.errored, 1);
        assert_eq!(stats.dropped, 0);

        // Items after the failing one were still written, in order
        assert_eq!(
            *store.order.lock().unwrap(),
            vec!["01001000", "01001000", "20040020"]
        );

        let recorded = errors.snapshot();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].code, "99000000");
        assert!(recorded[0].message.starts_with("relational: "));
    }

    #[tokio::test]
    async fn test_finish_drains_everything_queued() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let counters = Arc::new(RelationalCounters::default());
        let writer = RelationalWriter::spawn(store.clone(), 4, sink(&dir), counters.clone());

        let mut producers = tokio::task::JoinSet::new();
        for worker in 0..4 {
            let queue = writer.queue();
            producers.spawn(async move {
                for i in 0..25 {
                    let code = format!("{:02}{:06}", worker, i);
                    queue.enqueue(record(&code), Duration::from_secs(5)).await.unwrap();
                }
            });
        }
        while let Some(result) = producers.join_next().await {
            result.unwrap();
        }

        assert_eq!(writer.finish().await, 100);
        assert_eq!(counters.snapshot().inserted, 100);
        assert_eq!(store.count().await.unwrap(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_times_out_when_full() {
        let (sender, _receiver) = mpsc::channel(1);
        let queue = RelationalQueue { sender };

        queue
            .enqueue(record("01001000"), Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(queue.depth(), 1);

        let err = queue
            .enqueue(record("20040020"), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Full(_)));
    }

    #[tokio::test]
    async fn test_enqueue_after_writer_gone_is_closed() {
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);
        let queue = RelationalQueue { sender };

        let err = queue
            .enqueue(record("01001000"), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Closed));
    }
}

//! Terminal failure sink
//!
//! Every `record` call lands in three places: the append-only operational log,
//! the structured export (two-column `code,message` table) and the in-memory
//! list the checkpointer snapshots. Each destination has its own lock. The
//! export lock is held while the in-memory list is appended, and a checkpoint
//! rewrite of the export takes the same lock, so a record is never lost or
//! doubled by a rewrite.

use chrono::{DateTime, Utc};
use pcr_common::ErrorRecord;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Header row of the structured export
pub const EXPORT_HEADER: &str = "code,message";

/// One durable error destination
pub trait ErrorBackend: Send {
    /// Append one record
    fn append(&mut self, at: DateTime<Utc>, record: &ErrorRecord) -> io::Result<()>;

    /// Replace the destination contents with `records`
    fn rewrite(&mut self, _records: &[ErrorRecord]) -> io::Result<()> {
        Ok(())
    }
}

/// Append-only timestamped log: `<timestamp> | <code> | <message>`
pub struct OperationalLog {
    file: File,
}

impl OperationalLog {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl ErrorBackend for OperationalLog {
    fn append(&mut self, at: DateTime<Utc>, record: &ErrorRecord) -> io::Result<()> {
        let line = if record.code.is_empty() {
            format!(
                "{} | {}\n",
                pcr_common::time::log_timestamp(at),
                single_line(&record.message)
            )
        } else {
            format!(
                "{} | {} | {}\n",
                pcr_common::time::log_timestamp(at),
                record.code,
                single_line(&record.message)
            )
        };
        self.file.write_all(line.as_bytes())?;
        self.file.flush()
    }
}

/// Two-column `code,message` export with header
pub struct ErrorExport {
    path: PathBuf,
}

impl ErrorExport {
    pub fn open(path: &Path) -> io::Result<Self> {
        let needs_header = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        if needs_header {
            std::fs::write(path, format!("{}\n", EXPORT_HEADER))?;
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl ErrorBackend for ErrorExport {
    fn append(&mut self, _at: DateTime<Utc>, record: &ErrorRecord) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(export_row(record).as_bytes())
    }

    fn rewrite(&mut self, records: &[ErrorRecord]) -> io::Result<()> {
        crate::services::checkpoint::write_atomically(&self.path, render_export(records).as_bytes())
    }
}

/// Render the full export table
pub fn render_export(records: &[ErrorRecord]) -> String {
    let mut out = format!("{}\n", EXPORT_HEADER);
    for record in records {
        out.push_str(&export_row(record));
    }
    out
}

fn export_row(record: &ErrorRecord) -> String {
    format!("{},{}\n", csv_field(&record.code), csv_field(&record.message))
}

/// Quote a field when it contains a delimiter, quote or line break
pub fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn single_line(message: &str) -> String {
    message.replace(['\n', '\r'], " ")
}

/// Thread-safe accumulator for terminal failures
pub struct ErrorSink {
    log: Mutex<Box<dyn ErrorBackend>>,
    export: Mutex<Box<dyn ErrorBackend>>,
    records: Mutex<Vec<ErrorRecord>>,
    recorded: AtomicU64,
}

impl ErrorSink {
    pub fn new(log: Box<dyn ErrorBackend>, export: Box<dyn ErrorBackend>) -> Self {
        Self {
            log: Mutex::new(log),
            export: Mutex::new(export),
            records: Mutex::new(Vec::new()),
            recorded: AtomicU64::new(0),
        }
    }

    /// Sink writing to the operational log and export files
    pub fn open(log_path: &Path, export_path: &Path) -> io::Result<Self> {
        Ok(Self::new(
            Box::new(OperationalLog::open(log_path)?),
            Box::new(ErrorExport::open(export_path)?),
        ))
    }

    /// Record a terminal failure. `code` may be empty.
    pub fn record(&self, code: &str, message: impl Into<String>) {
        let record = ErrorRecord::new(code, message);
        let at = pcr_common::time::now();

        tracing::error!(code = %record.code, message = %record.message, "Terminal failure");

        {
            let mut log = lock(&self.log);
            if let Err(e) = log.append(at, &record) {
                tracing::warn!(error = %e, "Operational log append failed");
            }
        }

        let mut export = lock(&self.export);
        if let Err(e) = export.append(at, &record) {
            tracing::warn!(error = %e, "Error export append failed");
        }
        lock(&self.records).push(record);
        self.recorded.fetch_add(1, Ordering::Relaxed);
    }

    /// Rewrite the structured export from the in-memory list
    pub fn rewrite_export(&self) -> io::Result<usize> {
        let mut export = lock(&self.export);
        let snapshot = self.snapshot();
        export.rewrite(&snapshot)?;
        Ok(snapshot.len())
    }

    /// Copy of every record so far, in recording order
    pub fn snapshot(&self) -> Vec<ErrorRecord> {
        lock(&self.records).clone()
    }

    pub fn len(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lock a mutex, recovering the data if a holder panicked
fn lock<T: ?Sized>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn open_sink(dir: &TempDir) -> ErrorSink {
        ErrorSink::open(&dir.path().join("errors.log"), &dir.path().join("errors.csv")).unwrap()
    }

    #[test]
    fn test_record_reaches_all_destinations() {
        let dir = TempDir::new().unwrap();
        let sink = open_sink(&dir);

        sink.record("01001000", "postal code invalid or not found");
        sink.record("", "relational connect: refused");

        let log = std::fs::read_to_string(dir.path().join("errors.log")).unwrap();
        let lines: Vec<_> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("| 01001000 | postal code invalid or not found"));
        assert!(lines[1].ends_with("| relational connect: refused"));

        let export = std::fs::read_to_string(dir.path().join("errors.csv")).unwrap();
        assert_eq!(
            export,
            "code,message\n01001000,postal code invalid or not found\n,relational connect: refused\n"
        );

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.snapshot()[0], ErrorRecord::new("01001000", "postal code invalid or not found"));
    }

    #[test]
    fn test_csv_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_existing_export_keeps_single_header() {
        let dir = TempDir::new().unwrap();
        {
            let sink = open_sink(&dir);
            sink.record("11111111", "first run");
        }
        let sink = open_sink(&dir);
        sink.record("22222222", "second run");

        let export = std::fs::read_to_string(dir.path().join("errors.csv")).unwrap();
        assert_eq!(export.matches(EXPORT_HEADER).count(), 1);
        assert_eq!(export.lines().count(), 3);
    }

    #[test]
    fn test_concurrent_records_each_appear_once() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(open_sink(&dir));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        sink.record(&format!("{:04}{:04}", t, i), "timeout");
                        if i % 10 == 0 {
                            sink.rewrite_export().unwrap();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let log = std::fs::read_to_string(dir.path().join("errors.log")).unwrap();
        let export = std::fs::read_to_string(dir.path().join("errors.csv")).unwrap();
        assert_eq!(log.lines().count(), 200);
        assert_eq!(export.lines().count(), 201);
        assert_eq!(sink.snapshot().len(), 200);

        for t in 0..8 {
            for i in 0..25 {
                let code = format!("{:04}{:04}", t, i);
                assert_eq!(log.matches(&format!("| {} |", code)).count(), 1);
                assert_eq!(export.matches(&format!("{},", code)).count(), 1);
            }
        }
    }
}

//! Artifact checkpointing
//!
//! Snapshots the in-memory result list to a JSON array and an XML tree, and
//! rewrites the structured error export. Each file is written to a temp file
//! in the destination directory and renamed over the previous snapshot, so a
//! reader never sees a partial file.
//!
//! Checkpoints serialize on one lock; the record count of successive snapshots
//! within a run never decreases.

use crate::config::ArtifactPaths;
use crate::services::error_sink::ErrorSink;
use pcr_common::{AddressRecord, Result};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Counts written by one checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointSummary {
    pub records: usize,
    pub errors: usize,
}

/// Writes snapshot artifacts
pub struct Checkpointer {
    paths: ArtifactPaths,
    every: usize,
    write_lock: Mutex<()>,
}

impl Checkpointer {
    pub fn new(paths: ArtifactPaths, every: usize) -> Self {
        Self {
            paths,
            every,
            write_lock: Mutex::new(()),
        }
    }

    /// Whether `processed` lands on a periodic checkpoint boundary
    pub fn is_due(&self, processed: usize) -> bool {
        self.every > 0 && processed > 0 && processed % self.every == 0
    }

    /// Snapshot `results` (taken under its lock) and the error sink to disk
    pub fn checkpoint(
        &self,
        results: &Mutex<Vec<AddressRecord>>,
        errors: &ErrorSink,
    ) -> Result<CheckpointSummary> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let snapshot = results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        let json = serde_json::to_vec_pretty(&snapshot)?;
        write_atomically(&self.paths.json, &json)?;
        write_atomically(&self.paths.xml, render_xml(&snapshot).as_bytes())?;
        let error_count = errors.rewrite_export()?;

        debug!(
            records = snapshot.len(),
            errors = error_count,
            json = %self.paths.json.display(),
            "Checkpoint written"
        );

        Ok(CheckpointSummary {
            records: snapshot.len(),
            errors: error_count,
        })
    }

    /// Final, unconditional checkpoint
    pub fn finish(
        &self,
        results: &Mutex<Vec<AddressRecord>>,
        errors: &ErrorSink,
    ) -> Result<CheckpointSummary> {
        let summary = self.checkpoint(results, errors)?;
        info!(
            records = summary.records,
            errors = summary.errors,
            "Final artifacts written"
        );
        Ok(summary)
    }
}

/// Replace `path` with `contents` via temp file + rename in the same directory
pub fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// XML tree mirroring the JSON snapshot
pub fn render_xml(records: &[AddressRecord]) -> String {
    let mut out = String::from("<?xml version='1.0' encoding='utf-8'?>\n<addresses>");
    for record in records {
        out.push_str("<address>");
        for (name, value) in record.fields() {
            if value.is_empty() {
                out.push_str(&format!("<{} />", name));
            } else {
                out.push_str(&format!("<{0}>{1}</{0}>", name, escape_xml(value)));
            }
        }
        out.push_str("</address>");
    }
    out.push_str("</addresses>\n");
    out
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

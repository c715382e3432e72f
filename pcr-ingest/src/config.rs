//! Configuration for pcr-ingest
//!
//! Resolution priority: command line → environment (`PCR_*`) → TOML → compiled
//! defaults. The command-line and environment layers are applied in `main`
//! through clap; this module owns the TOML shape, defaults and validation.

use pcr_common::time::millis_to_duration;
use pcr_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Module name used for config file discovery (`pcr/pcr-ingest.toml`)
pub const MODULE_NAME: &str = "pcr-ingest";

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Concurrent lookup workers
    pub workers: usize,
    /// Global request ceiling (requests per second)
    pub rate_per_sec: f64,
    /// Attempts per code, first attempt included
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// Status codes treated as retryable server / rate-limit responses
    pub retry_statuses: Vec<u16>,
    /// Checkpoint every N processed codes (0 disables periodic checkpoints)
    pub checkpoint_every: usize,
    /// Progress log every N processed codes (0 disables)
    pub stats_every: usize,
    pub queue_capacity: usize,
    pub enqueue_timeout_ms: u64,
    /// Try plain HTTP once after secure transport retries are exhausted
    pub insecure_fallback: bool,
    pub lookup_host: String,
    pub user_agent: String,
    pub output_dir: Option<PathBuf>,
    pub json_file: String,
    pub xml_file: String,
    pub errors_csv_file: String,
    pub errors_log_file: String,
    /// SQLite URL of the relational store; empty disables the sink
    pub relational_url: String,
    /// SQLite URL of the document store; empty disables the sink
    pub document_url: String,
    /// Header of the input column holding candidate codes
    pub input_column: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: 20,
            rate_per_sec: 0.5,
            max_attempts: 5,
            backoff_base_ms: 800,
            backoff_cap_ms: 10_000,
            connect_timeout_secs: 120,
            read_timeout_secs: 120,
            retry_statuses: vec![429, 500, 502, 503, 504],
            checkpoint_every: 10,
            stats_every: 10,
            queue_capacity: 2000,
            enqueue_timeout_ms: 5000,
            insecure_fallback: true,
            lookup_host: "viacep.com.br".to_string(),
            user_agent: format!("pcr-ingest/{}", env!("CARGO_PKG_VERSION")),
            output_dir: None,
            json_file: "addresses.json".to_string(),
            xml_file: "addresses.xml".to_string(),
            errors_csv_file: "lookup_errors.csv".to_string(),
            errors_log_file: "errors.log".to_string(),
            relational_url: "sqlite://addresses.db?mode=rwc".to_string(),
            document_url: String::new(),
            input_column: "cep".to_string(),
        }
    }
}

impl IngestConfig {
    /// Load from an explicit TOML file, the discovered one, or defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        pcr_common::config::load_toml_or_default(explicit, MODULE_NAME)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let interval_fits = Duration::try_from_secs_f64(1.0 / self.rate_per_sec).is_ok();
        if !(self.rate_per_sec > 0.0) || !self.rate_per_sec.is_finite() || !interval_fits {
            return Err(Error::Config(format!(
                "rate_per_sec must be a finite number > 0 (got {})",
                self.rate_per_sec
            )));
        }
        if self.workers == 0 {
            return Err(Error::Config("workers must be >= 1".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be >= 1".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be >= 1".to_string()));
        }
        if self.lookup_host.trim().is_empty() {
            return Err(Error::Config("lookup_host must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn backoff_base(&self) -> Duration {
        millis_to_duration(self.backoff_base_ms)
    }

    pub fn backoff_cap(&self) -> Duration {
        millis_to_duration(self.backoff_cap_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Total request timeout (connect + read)
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs + self.read_timeout_secs)
    }

    pub fn enqueue_timeout(&self) -> Duration {
        millis_to_duration(self.enqueue_timeout_ms)
    }

    /// Artifact locations under `output_dir`
    pub fn artifact_paths(&self, output_dir: &Path) -> ArtifactPaths {
        ArtifactPaths {
            json: output_dir.join(&self.json_file),
            xml: output_dir.join(&self.xml_file),
            errors_csv: output_dir.join(&self.errors_csv_file),
            errors_log: output_dir.join(&self.errors_log_file),
        }
    }
}

/// Durable artifact file locations
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub json: PathBuf,
    pub xml: PathBuf,
    pub errors_csv: PathBuf,
    pub errors_log: PathBuf,
}

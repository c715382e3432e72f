//! pcr-ingest - postal code resolution pipeline
//!
//! Reads a seed list of candidate postal codes, resolves each against the
//! upstream lookup service under a global rate limit, and persists the results
//! to the relational and document stores plus JSON/XML/CSV snapshot files.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pcr_ingest::{input, IngestConfig, Pipeline};

/// Command-line arguments for pcr-ingest
#[derive(Parser, Debug)]
#[command(name = "pcr-ingest")]
#[command(about = "Resolve postal codes and persist the address records")]
#[command(version)]
struct Args {
    /// TOML config file (default: platform config dir, pcr/pcr-ingest.toml)
    #[arg(short, long, env = "PCR_CONFIG")]
    config: Option<PathBuf>,

    /// Seed list file with candidate codes
    #[arg(short, long, env = "PCR_INPUT")]
    input: Option<PathBuf>,

    /// Folder for snapshot artifacts and the error log (env: PCR_OUTPUT_DIR)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Concurrent lookup workers
    #[arg(short, long, env = "PCR_WORKERS")]
    workers: Option<usize>,

    /// Global request rate (requests per second)
    #[arg(short, long, env = "PCR_RATE")]
    rate: Option<f64>,

    /// Relational store URL (empty disables the sink)
    #[arg(long, env = "PCR_RELATIONAL_URL")]
    relational_url: Option<String>,

    /// Document store URL (empty disables the sink)
    #[arg(long, env = "PCR_DOCUMENT_URL")]
    document_url: Option<String>,

    /// Checkpoint after this many completed lookups
    #[arg(long, env = "PCR_CHECKPOINT_EVERY")]
    checkpoint_every: Option<usize>,

    /// Never retry over plain HTTP after secure transport failures
    #[arg(long)]
    no_insecure_fallback: bool,

    /// Candidate codes, in addition to the seed list
    codes: Vec<String>,
}

impl Args {
    /// Layer command-line and environment values over the file config
    fn apply(&self, config: &mut IngestConfig) {
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(rate) = self.rate {
            config.rate_per_sec = rate;
        }
        if let Some(url) = &self.relational_url {
            config.relational_url = url.clone();
        }
        if let Some(url) = &self.document_url {
            config.document_url = url.clone();
        }
        if let Some(every) = self.checkpoint_every {
            config.checkpoint_every = every;
        }
        if self.no_insecure_fallback {
            config.insecure_fallback = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pcr_ingest=info,pcr_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting pcr-ingest");
    info!(
        "Version: {} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    let mut config =
        IngestConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let output_dir = pcr_common::config::resolve_output_folder(
        args.output_dir.as_deref(),
        "PCR_OUTPUT_DIR",
        config.output_dir.as_deref(),
    );

    let mut candidates = match &args.input {
        Some(path) => input::read_codes(path, &config.input_column)
            .with_context(|| format!("Failed to read seed list {}", path.display()))?,
        None => Vec::new(),
    };
    candidates.extend(args.codes.iter().cloned());
    if candidates.is_empty() {
        bail!("No candidate codes: pass --input <file> or codes as arguments");
    }

    info!(
        "Workers: {} | Rate: {:.2} req/s (~{:.0}/min)",
        config.workers,
        config.rate_per_sec,
        config.rate_per_sec * 60.0
    );

    let summary = Pipeline::new(config, output_dir)
        .run(candidates)
        .await
        .context("Pipeline run failed")?;

    info!(
        "Done: {} ok, {} failed of {} in {:.1}s",
        summary.succeeded,
        summary.failed,
        summary.total,
        summary.elapsed.as_secs_f64()
    );
    Ok(())
}

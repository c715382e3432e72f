//! Persistence backends for pcr-ingest
//!
//! Two independent stores, each behind a trait:
//! - [`addresses::RelationalStore`]: schema-enforced table keyed by code,
//!   written by the single relational writer
//! - [`documents::DocumentStore`]: schema-free document collection keyed by
//!   code, upserted concurrently by the lookup workers

pub mod addresses;
pub mod documents;

pub use addresses::{RelationalStore, SqliteAddressStore};
pub use documents::{DocumentStore, SqliteDocumentStore, UpsertOutcome};

use pcr_common::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

/// Connect / acquire timeout for store connections
pub const DB_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a SQLite pool for `url`, creating the database file if missing
pub async fn connect_pool(url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(DB_CONNECT_TIMEOUT);

    tracing::debug!("Connecting to database: {}", url);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(DB_CONNECT_TIMEOUT)
        .connect_with(options)
        .await?;

    Ok(pool)
}

//! Document collection keyed by postal code
//!
//! Documents are stored as JSON bodies with no schema beyond the code key.
//! An upsert replaces the whole document and reports whether it created a new
//! one or replaced an existing one.

use async_trait::async_trait;
use pcr_common::{AddressRecord, Result};
use sqlx::SqlitePool;

/// Outcome of one document upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// New document created
    Upserted,
    /// Existing document replaced
    Updated,
}

/// Concurrently-written document sink
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Connectivity check, run once before the pipeline starts
    async fn ping(&self) -> Result<()>;

    /// Create or replace the document for `record.code`
    async fn upsert(&self, record: &AddressRecord) -> Result<UpsertOutcome>;
}

/// JSON document collection in its own SQLite database
#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect with up to `max_connections` pooled connections (one per worker)
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = super::connect_pool(url, max_connections).await?;
        Ok(Self::new(pool))
    }

    async fn ensure_collection(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS address_documents (
                code TEXT PRIMARY KEY NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load one document by code
    pub async fn load(&self, code: &str) -> Result<Option<AddressRecord>> {
        let body: Option<(String,)> =
            sqlx::query_as("SELECT body FROM address_documents WHERE code = ?")
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;

        match body {
            Some((body,)) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM address_documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        self.ensure_collection().await
    }

    async fn upsert(&self, record: &AddressRecord) -> Result<UpsertOutcome> {
        let body = serde_json::to_string(record)?;
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query(
            "INSERT INTO address_documents (code, body) VALUES (?, ?) ON CONFLICT(code) DO NOTHING",
        )
        .bind(&record.code)
        .bind(&body)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if !created {
            sqlx::query(
                "UPDATE address_documents SET body = ?, updated_at = CURRENT_TIMESTAMP WHERE code = ?",
            )
            .bind(&body)
            .bind(&record.code)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(if created {
            UpsertOutcome::Upserted
        } else {
            UpsertOutcome::Updated
        })
    }
}

//! Relational address table
//!
//! One row per postal code. Inserts are idempotent: an existing code makes the
//! statement a no-op, reported as `false` (ignored).

use async_trait::async_trait;
use pcr_common::{AddressRecord, Result};
use sqlx::SqlitePool;

/// Single-writer relational sink
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Verify connectivity and the table; returns the current row count
    async fn probe(&self) -> Result<i64>;

    /// Insert unless the code exists. `true` when a row was written.
    async fn insert_ignore(&self, record: &AddressRecord) -> Result<bool>;

    async fn count(&self) -> Result<i64>;
}

/// SQLite-backed address table
#[derive(Clone)]
pub struct SqliteAddressStore {
    pool: SqlitePool,
}

impl SqliteAddressStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `url` with a single connection (one writer)
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = super::connect_pool(url, 1).await?;
        Ok(Self::new(pool))
    }

    /// Create the addresses table if it does not exist
    pub async fn init_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS addresses (
                code TEXT PRIMARY KEY NOT NULL,
                street TEXT NOT NULL DEFAULT '',
                complement TEXT NOT NULL DEFAULT '',
                unit TEXT NOT NULL DEFAULT '',
                neighborhood TEXT NOT NULL DEFAULT '',
                locality TEXT NOT NULL DEFAULT '',
                state_code TEXT NOT NULL DEFAULT '',
                state_name TEXT NOT NULL DEFAULT '',
                region TEXT NOT NULL DEFAULT '',
                administrative_code TEXT NOT NULL DEFAULT '',
                fiscal_zone_code TEXT NOT NULL DEFAULT '',
                area_code TEXT NOT NULL DEFAULT '',
                financial_system_code TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load one row by code
    pub async fn load(&self, code: &str) -> Result<Option<AddressRecord>> {
        let row = sqlx::query_as::<_, AddressRow>(
            r#"
            SELECT code, street, complement, unit, neighborhood, locality,
                   state_code, state_name, region, administrative_code,
                   fiscal_zone_code, area_code, financial_system_code
            FROM addresses
            WHERE code = ?
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(AddressRecord::from))
    }
}

#[async_trait]
impl RelationalStore for SqliteAddressStore {
    async fn probe(&self) -> Result<i64> {
        self.init_table().await?;
        self.count().await
    }

    async fn insert_ignore(&self, record: &AddressRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO addresses (
                code, street, complement, unit, neighborhood, locality,
                state_code, state_name, region, administrative_code,
                fiscal_zone_code, area_code, financial_system_code
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(code) DO NOTHING
            "#,
        )
        .bind(&record.code)
        .bind(&record.street)
        .bind(&record.complement)
        .bind(&record.unit)
        .bind(&record.neighborhood)
        .bind(&record.locality)
        .bind(&record.state_code)
        .bind(&record.state_name)
        .bind(&record.region)
        .bind(&record.administrative_code)
        .bind(&record.fiscal_zone_code)
        .bind(&record.area_code)
        .bind(&record.financial_system_code)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM addresses")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[derive(sqlx::FromRow)]
struct AddressRow {
    code: String,
    street: String,
    complement: String,
    unit: String,
    neighborhood: String,
    locality: String,
    state_code: String,
    state_name: String,
    region: String,
    administrative_code: String,
    fiscal_zone_code: String,
    area_code: String,
    financial_system_code: String,
}

impl From<AddressRow> for AddressRecord {
    fn from(row: AddressRow) -> Self {
        AddressRecord {
            code: row.code,
            street: row.street,
            complement: row.complement,
            unit: row.unit,
            neighborhood: row.neighborhood,
            locality: row.locality,
            state_code: row.state_code,
            state_name: row.state_name,
            region: row.region,
            administrative_code: row.administrative_code,
            fiscal_zone_code: row.fiscal_zone_code,
            area_code: row.area_code,
            financial_system_code: row.financial_system_code,
        }
    }
}

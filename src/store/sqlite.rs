use std::str::FromStr;
#[cfg(test)]
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::models::{ExtractionRecord, Listing, Price, Snapshot, SnapshotEntry};
use crate::store::error::{Result, StoreError};
use crate::store::traits::ListingStore;

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS listing (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        external_id TEXT NOT NULL UNIQUE,
        url TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        image_url TEXT,
        description TEXT NOT NULL,
        size REAL NOT NULL,
        year INTEGER,
        floor TEXT,
        accessed_time TEXT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS price (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        listing_id INTEGER NOT NULL REFERENCES listing(id),
        amount REAL NOT NULL,
        observed_at TEXT NOT NULL
    )
    ",
    "CREATE INDEX IF NOT EXISTS price_listing_observed ON price (listing_id, observed_at)",
];

/// SQLite-backed listing store.
///
/// Each operation checks a connection out of the pool for its own duration
/// and every write runs in its own transaction.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `database_url`
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        info!(database_url, "Connected to listing database");
        Ok(Self { pool })
    }

    /// A private in-memory database, kept alive by a single pooled connection
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.create_schema().await?;
        Ok(store)
    }

    /// Create the listing and price tables if they do not exist yet
    pub async fn create_schema(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        debug!("Listing schema ready");
        Ok(())
    }
}

#[async_trait]
impl ListingStore for SqliteStore {
    async fn get_current_state(&self) -> Result<Snapshot> {
        let rows: Vec<(String, i64, f64)> = sqlx::query_as(
            r"
            SELECT l.external_id, l.id, p.amount
            FROM listing l
            JOIN price p ON p.listing_id = l.id
            ORDER BY l.id ASC, p.observed_at ASC, p.id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut snapshot = Snapshot::new();
        for (external_id, row_id, amount) in rows {
            snapshot
                .entry(external_id)
                .or_insert_with(|| SnapshotEntry {
                    row_id,
                    prices: Vec::new(),
                })
                .prices
                .push(amount);
        }

        debug!(listings = snapshot.len(), "Loaded listing snapshot");
        Ok(snapshot)
    }

    async fn insert_new_listing(
        &self,
        record: &ExtractionRecord,
        observed_at: DateTime<Utc>,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let row_id = sqlx::query(
            r"
            INSERT INTO listing
            (external_id, url, title, image_url, description, size, year, floor, accessed_time)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&record.external_id)
        .bind(&record.url)
        .bind(&record.title)
        .bind(&record.image_url)
        .bind(&record.description)
        .bind(record.size)
        .bind(record.year)
        .bind(&record.floor)
        .bind(observed_at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query("INSERT INTO price (listing_id, amount, observed_at) VALUES (?, ?, ?)")
            .bind(row_id)
            .bind(record.price)
            .bind(observed_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(external_id = %record.external_id, row_id, "Listing saved");
        Ok(row_id)
    }

    async fn get_listing(&self, external_id: &str) -> Result<Option<Listing>> {
        let listing = sqlx::query_as::<_, Listing>(
            r"
            SELECT id, external_id, url, title, image_url, description, size, year, floor, accessed_time
            FROM listing
            WHERE external_id = ?
            ",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(listing)
    }

    async fn price_history(&self, row_id: i64) -> Result<Vec<Price>> {
        let prices = sqlx::query_as::<_, Price>(
            r"
            SELECT amount, observed_at
            FROM price
            WHERE listing_id = ?
            ORDER BY observed_at ASC, id ASC
            ",
        )
        .bind(row_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(prices)
    }

    async fn append_price(
        &self,
        row_id: i64,
        amount: f64,
        observed_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM listing WHERE id = ?")
            .bind(row_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::NotFound(row_id));
        }

        sqlx::query("INSERT INTO price (listing_id, amount, observed_at) VALUES (?, ?, ?)")
            .bind(row_id)
            .bind(amount)
            .bind(observed_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(row_id, amount, "Price saved");
        Ok(())
    }
}

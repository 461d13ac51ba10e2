use crate::models::{ExtractionRecord, Listing, Price, Snapshot};
use crate::store::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable persistence of listings and their price history
///
/// Every write commits on its own, so a failure leaves earlier writes intact.
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// All stored listings with their price histories, oldest price first
    async fn get_current_state(&self) -> Result<Snapshot>;

    /// Store a listing together with its first price and return its row id.
    ///
    /// Fails with `StoreError::Conflict` when the identifier or URL exists.
    async fn insert_new_listing(
        &self,
        record: &ExtractionRecord,
        observed_at: DateTime<Utc>,
    ) -> Result<i64>;

    /// Look up a stored listing by its external identifier
    async fn get_listing(&self, external_id: &str) -> Result<Option<Listing>>;

    /// Price observations of one listing, oldest first
    async fn price_history(&self, row_id: i64) -> Result<Vec<Price>>;

    /// Append a price observation to an existing listing
    async fn append_price(&self, row_id: i64, amount: f64, observed_at: DateTime<Utc>)
        -> Result<()>;
}

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single listing as read off a result page during one scrape cycle.
///
/// Never persisted as-is: on first sight it becomes a `listing` row plus its
/// first `price` row, on later sightings only the price may be appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionRecord {
    pub external_id: String,
    pub title: String,
    pub image_url: Option<String>,
    pub description: String,
    pub price: f64,
    pub size: f64,
    pub year: Option<i32>,
    pub floor: Option<String>,
    pub url: String,
}

impl ExtractionRecord {
    /// Checks the fields the store and the reconciliation rely on.
    pub fn validate(&self) -> Result<(), String> {
        if self.external_id.trim().is_empty() {
            return Err("missing listing identifier".to_string());
        }
        if self.url.trim().is_empty() {
            return Err(format!("listing {} has no url", self.external_id));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(format!(
                "listing {} has invalid price {}",
                self.external_id, self.price
            ));
        }
        Ok(())
    }
}

/// A persisted listing row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Listing {
    pub id: i64,
    pub external_id: String,
    pub url: String,
    pub title: String,
    pub image_url: Option<String>,
    pub description: String,
    pub size: f64,
    pub year: Option<i32>,
    pub floor: Option<String>,
    pub accessed_time: DateTime<Utc>,
}

/// One observed price of a listing. Rows are append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Price {
    pub amount: f64,
    pub observed_at: DateTime<Utc>,
}

/// What the store knows about one listing at the start of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub row_id: i64,
    /// Price amounts ordered by observation time, oldest first.
    pub prices: Vec<f64>,
}

impl SnapshotEntry {
    pub fn latest_price(&self) -> Option<f64> {
        self.prices.last().copied()
    }
}

/// Store view keyed by external listing identifier.
pub type Snapshot = HashMap<String, SnapshotEntry>;

/// A new or re-priced listing to announce, with its full price history.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NotificationEntry {
    pub record: ExtractionRecord,
    /// Oldest first; the last element is the price observed in this run.
    pub prices: Vec<f64>,
}

impl NotificationEntry {
    pub fn current_price(&self) -> f64 {
        self.prices.last().copied().unwrap_or(self.record.price)
    }

    /// Every price before the current one.
    pub fn previous_prices(&self) -> &[f64] {
        match self.prices.split_last() {
            Some((_, earlier)) => earlier,
            None => &[],
        }
    }
}

#[cfg(test)]
pub(crate) fn record(external_id: &str, price: f64) -> ExtractionRecord {
    ExtractionRecord {
        external_id: external_id.to_string(),
        title: format!("Stanovanje {external_id}"),
        image_url: None,
        description: "2-sobno stanovanje".to_string(),
        price,
        size: 54.3,
        year: Some(1978),
        floor: Some("3/5".to_string()),
        url: format!("https://www.nepremicnine.net/oglasi-oddaja/stanovanje_{external_id}/"),
    }
}

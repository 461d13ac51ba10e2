use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{ExtractionRecord, Listing, Price, Snapshot, SnapshotEntry};
use crate::store::error::{Result, StoreError};
use crate::store::traits::ListingStore;

#[derive(Default)]
struct State {
    next_id: i64,
    listings: Vec<Listing>,
    prices: HashMap<i64, Vec<f64>>,
}

/// In-memory store for tests, with failure injection per identifier
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    /// Inserts for these identifiers fail as if another writer got there
    /// first, having stored the listing at the given price
    pub racing_inserts: Mutex<HashMap<String, f64>>,
    /// Inserts for these identifiers report a conflict but leave no row
    pub phantom_conflicts: Mutex<HashSet<String>>,
    /// Writes touching these identifiers fail with a database error
    pub broken: Mutex<HashSet<String>>,
    /// Row lookups for these identifiers fail with a database error
    pub failing_lookups: Mutex<HashSet<String>>,
    /// Number of upcoming snapshot reads that fail
    pub snapshot_failures: Mutex<usize>,
    pub writes: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a listing with a price history
    pub fn seed(&self, record: &ExtractionRecord, prices: &[f64]) -> i64 {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.listings.push(listing_row(id, record, Utc::now()));
        state.prices.insert(id, prices.to_vec());
        id
    }

    pub fn prices_of(&self, external_id: &str) -> Option<Vec<f64>> {
        let state = self.state.lock().unwrap();
        let listing = state.listings.iter().find(|l| l.external_id == external_id)?;
        state.prices.get(&listing.id).cloned()
    }

    fn check_broken(&self, external_id: &str) -> Result<()> {
        if self.broken.lock().unwrap().contains(external_id) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn check_lookup(&self, external_id: &str) -> Result<()> {
        if self.failing_lookups.lock().unwrap().contains(external_id) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn external_id_of(&self, row_id: i64) -> Result<String> {
        let state = self.state.lock().unwrap();
        state
            .listings
            .iter()
            .find(|l| l.id == row_id)
            .map(|l| l.external_id.clone())
            .ok_or(StoreError::NotFound(row_id))
    }
}

fn listing_row(id: i64, record: &ExtractionRecord, observed_at: DateTime<Utc>) -> Listing {
    Listing {
        id,
        external_id: record.external_id.clone(),
        url: record.url.clone(),
        title: record.title.clone(),
        image_url: record.image_url.clone(),
        description: record.description.clone(),
        size: record.size,
        year: record.year,
        floor: record.floor.clone(),
        accessed_time: observed_at,
    }
}

#[async_trait]
impl ListingStore for MemoryStore {
    async fn get_current_state(&self) -> Result<Snapshot> {
        {
            let mut failures = self.snapshot_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .listings
            .iter()
            .map(|l| {
                (
                    l.external_id.clone(),
                    SnapshotEntry {
                        row_id: l.id,
                        prices: state.prices.get(&l.id).cloned().unwrap_or_default(),
                    },
                )
            })
            .collect())
    }

    async fn insert_new_listing(
        &self,
        record: &ExtractionRecord,
        observed_at: DateTime<Utc>,
    ) -> Result<i64> {
        self.check_broken(&record.external_id)?;
        let raced = self.racing_inserts.lock().unwrap().remove(&record.external_id);
        if let Some(stored_price) = raced {
            self.seed(record, &[stored_price]);
            return Err(StoreError::Conflict(format!(
                "UNIQUE constraint failed: listing.external_id ({})",
                record.external_id
            )));
        }
        if self
            .phantom_conflicts
            .lock()
            .unwrap()
            .contains(&record.external_id)
        {
            return Err(StoreError::Conflict(record.external_id.clone()));
        }

        let mut state = self.state.lock().unwrap();
        if state
            .listings
            .iter()
            .any(|l| l.external_id == record.external_id || l.url == record.url)
        {
            return Err(StoreError::Conflict(record.external_id.clone()));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.listings.push(listing_row(id, record, observed_at));
        state.prices.insert(id, vec![record.price]);
        *self.writes.lock().unwrap() += 1;
        Ok(id)
    }

    async fn get_listing(&self, external_id: &str) -> Result<Option<Listing>> {
        self.check_lookup(external_id)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .listings
            .iter()
            .find(|l| l.external_id == external_id)
            .cloned())
    }

    async fn price_history(&self, row_id: i64) -> Result<Vec<Price>> {
        let external_id = self.external_id_of(row_id)?;
        self.check_lookup(&external_id)?;
        let state = self.state.lock().unwrap();
        let observed_at = Utc::now();
        Ok(state
            .prices
            .get(&row_id)
            .map(|prices| {
                prices
                    .iter()
                    .map(|&amount| Price {
                        amount,
                        observed_at,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn append_price(
        &self,
        row_id: i64,
        amount: f64,
        _observed_at: DateTime<Utc>,
    ) -> Result<()> {
        let external_id = self.external_id_of(row_id)?;
        self.check_broken(&external_id)?;

        let mut state = self.state.lock().unwrap();
        state.prices.entry(row_id).or_default().push(amount);
        *self.writes.lock().unwrap() += 1;
        Ok(())
    }
}

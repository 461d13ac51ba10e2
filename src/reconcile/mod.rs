//! Change detection between a freshly extracted batch and the stored listings.
//!
//! [`plan`] is pure: it compares a batch with a snapshot and decides which
//! writes to make and which listings to announce. [`apply`] performs those
//! writes one listing at a time, so one failing listing never blocks the
//! others.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::models::{ExtractionRecord, NotificationEntry, Snapshot};
use crate::store::error::StoreError;
use crate::store::ListingStore;

/// A write the store has to perform for one listing
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Store a listing seen for the first time together with its first price
    InsertListing(ExtractionRecord),
    /// Record a new price for a known listing
    AppendPrice {
        external_id: String,
        row_id: i64,
        amount: f64,
    },
}

impl Mutation {
    pub fn external_id(&self) -> &str {
        match self {
            Mutation::InsertListing(record) => &record.external_id,
            Mutation::AppendPrice { external_id, .. } => external_id,
        }
    }
}

/// Decisions for one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub mutations: Vec<Mutation>,
    /// New and re-priced listings in batch order
    pub notifications: Vec<NotificationEntry>,
    pub unchanged: usize,
    /// Records dropped because they failed validation
    pub skipped: usize,
}

/// Compare a batch against the stored snapshot.
///
/// Each identifier yields at most one mutation and one notification. Only the
/// latest stored price is compared, so a price returning to an earlier value
/// is reported again. Stored listings missing from the batch are ignored.
pub fn plan(records: &IndexMap<String, ExtractionRecord>, snapshot: &Snapshot) -> Plan {
    let mut plan = Plan::default();

    for (external_id, record) in records {
        if let Err(reason) = record.validate() {
            warn!(external_id = %external_id, reason = %reason, "Skipping malformed listing");
            plan.skipped += 1;
            continue;
        }

        match snapshot.get(external_id) {
            None => {
                info!(external_id = %external_id, price = record.price, "New listing found");
                plan.mutations.push(Mutation::InsertListing(record.clone()));
                plan.notifications.push(NotificationEntry {
                    record: record.clone(),
                    prices: vec![record.price],
                });
            }
            Some(stored) if stored.latest_price() != Some(record.price) => {
                info!(
                    external_id = %external_id,
                    old_price = ?stored.latest_price(),
                    new_price = record.price,
                    "New price detected"
                );
                plan.mutations.push(Mutation::AppendPrice {
                    external_id: external_id.clone(),
                    row_id: stored.row_id,
                    amount: record.price,
                });
                let mut prices = stored.prices.clone();
                prices.push(record.price);
                plan.notifications.push(NotificationEntry {
                    record: record.clone(),
                    prices,
                });
            }
            Some(_) => {
                debug!(external_id = %external_id, "No new price detected");
                plan.unchanged += 1;
            }
        }
    }

    plan
}

/// How an insert that hit an already stored row was settled
#[derive(Debug, Clone, PartialEq)]
pub enum Recovery {
    /// The stored row already ends with the observed price
    AlreadyCurrent,
    /// The observed price was appended; the full stored history, oldest first
    Repriced(Vec<f64>),
}

/// What happened while writing a plan to the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyOutcome {
    pub applied: usize,
    /// Inserts that hit an existing row and were resolved against it
    pub recovered: HashMap<String, Recovery>,
    /// Identifiers whose write was abandoned for this run
    pub failed: Vec<String>,
}

/// Write each mutation independently.
///
/// A uniqueness conflict on insert means another writer stored the listing
/// first; the existing row is re-read and treated as the stored state. Any
/// other error is logged and the listing is left for the next run.
pub async fn apply(
    store: &dyn ListingStore,
    mutations: &[Mutation],
    observed_at: DateTime<Utc>,
) -> ApplyOutcome {
    let mut outcome = ApplyOutcome::default();

    for mutation in mutations {
        let external_id = mutation.external_id();
        let result = match mutation {
            Mutation::InsertListing(record) => {
                match store.insert_new_listing(record, observed_at).await {
                    Ok(row_id) => {
                        debug!(external_id, row_id, "New listing saved");
                        Ok(())
                    }
                    Err(e) if e.is_conflict() => {
                        match recover_conflict(store, record, observed_at, e).await {
                            Ok(recovery) => {
                                outcome.recovered.insert(external_id.to_string(), recovery);
                                continue;
                            }
                            Err(e) => Err(e),
                        }
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Mutation::AppendPrice { row_id, amount, .. } => store
                .append_price(*row_id, *amount, observed_at)
                .await
                .map_err(anyhow::Error::from),
        };

        match result {
            Ok(()) => outcome.applied += 1,
            Err(e) => {
                let error = format!("{e:#}");
                warn!(external_id, error = %error, "Error saving listing to the database");
                outcome.failed.push(external_id.to_string());
            }
        }
    }

    outcome
}

/// Settle an insert that lost the race against another writer.
///
/// The row the other writer stored is compared like any snapshot entry: the
/// observed price is appended only when it differs from the latest stored one.
async fn recover_conflict(
    store: &dyn ListingStore,
    record: &ExtractionRecord,
    observed_at: DateTime<Utc>,
    conflict: StoreError,
) -> Result<Recovery> {
    let external_id = record.external_id.as_str();
    let existing = store
        .get_listing(external_id)
        .await
        .context("failed to re-read conflicting row")?
        .ok_or_else(|| {
            anyhow::Error::new(conflict).context("conflicting row not found on re-read")
        })?;

    let mut prices: Vec<f64> = store
        .price_history(existing.id)
        .await
        .context("failed to read prices of conflicting row")?
        .into_iter()
        .map(|price| price.amount)
        .collect();

    if prices.last() == Some(&record.price) {
        info!(
            external_id,
            row_id = existing.id,
            "Listing was already stored with the same price"
        );
        return Ok(Recovery::AlreadyCurrent);
    }

    store
        .append_price(existing.id, record.price, observed_at)
        .await
        .context("failed to append price to conflicting row")?;
    info!(
        external_id,
        row_id = existing.id,
        old_price = ?prices.last(),
        new_price = record.price,
        "Listing was already stored, appended price to existing row"
    );
    prices.push(record.price);
    Ok(Recovery::Repriced(prices))
}

/// Result of reconciling one channel's batch
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Listings to announce; those whose write failed are left out
    pub notifications: Vec<NotificationEntry>,
    pub outcome: ApplyOutcome,
    pub unchanged: usize,
    pub skipped: usize,
}

/// Read the snapshot, plan against it and apply the plan
pub async fn reconcile(
    store: &dyn ListingStore,
    records: &IndexMap<String, ExtractionRecord>,
    observed_at: DateTime<Utc>,
) -> Result<Reconciliation> {
    let snapshot = store
        .get_current_state()
        .await
        .context("Failed to load stored listings")?;

    let plan = plan(records, &snapshot);
    let outcome = apply(store, &plan.mutations, observed_at).await;

    let failed: HashSet<&str> = outcome.failed.iter().map(String::as_str).collect();
    let notifications = plan
        .notifications
        .into_iter()
        .filter(|entry| !failed.contains(entry.record.external_id.as_str()))
        .filter_map(|mut entry| match outcome.recovered.get(&entry.record.external_id) {
            None => Some(entry),
            Some(Recovery::AlreadyCurrent) => None,
            Some(Recovery::Repriced(prices)) => {
                entry.prices = prices.clone();
                Some(entry)
            }
        })
        .collect();

    Ok(Reconciliation {
        notifications,
        outcome,
        unchanged: plan.unchanged,
        skipped: plan.skipped,
    })
}

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::models::NotificationEntry;
use crate::notify::RunReport;
use crate::reconcile;
use crate::scrapers::{accumulate, ChannelTarget, ListingExtractor};
use crate::store::ListingStore;

/// Run one scrape over every channel, in order.
///
/// A channel that fails is flagged in the report and the run moves on to the
/// next channel; nothing is propagated to the caller.
pub async fn run_spider(
    extractor: &dyn ListingExtractor,
    store: &dyn ListingStore,
    channels: &[ChannelTarget],
    max_pages: usize,
) -> RunReport {
    info!(channels = channels.len(), "Spider started");
    let mut report = RunReport::default();

    for channel in channels {
        match scrape_channel(extractor, store, channel, max_pages).await {
            Ok(entries) => {
                info!(
                    channel = %channel.channel_id,
                    found = entries.len(),
                    "Channel scraped"
                );
                report.record_entries(channel, entries);
            }
            Err(e) => {
                let error = format!("{e:#}");
                warn!(channel = %channel.channel_id, error = %error, "Channel scrape failed");
                report.record_failure(channel);
            }
        }
    }

    info!("Spider finished. {report}");
    report
}

async fn scrape_channel(
    extractor: &dyn ListingExtractor,
    store: &dyn ListingStore,
    channel: &ChannelTarget,
    max_pages: usize,
) -> Result<Vec<NotificationEntry>> {
    let batch = accumulate(extractor, &channel.start_url, max_pages).await?;
    let result = reconcile::reconcile(store, &batch.records, Utc::now()).await?;

    info!(
        channel = %channel.channel_id,
        applied = result.outcome.applied,
        recovered = result.outcome.recovered.len(),
        failed = result.outcome.failed.len(),
        unchanged = result.unchanged,
        skipped = result.skipped,
        "Listings reconciled"
    );

    Ok(result.notifications)
}

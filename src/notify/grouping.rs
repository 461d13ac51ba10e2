use std::fmt;

use crate::models::NotificationEntry;
use crate::scrapers::ChannelTarget;

/// Everything one channel should be told about a run
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelReport {
    pub channel_id: String,
    pub webhook_url: Option<String>,
    /// New and re-priced listings, in reconciliation order
    pub entries: Vec<NotificationEntry>,
    /// Set when the channel's scrape or reconciliation failed this run
    pub failed: bool,
}

impl ChannelReport {
    pub fn new(target: &ChannelTarget) -> Self {
        Self {
            channel_id: target.channel_id.clone(),
            webhook_url: target.webhook_url.clone(),
            entries: Vec::new(),
            failed: false,
        }
    }

    /// Summary line, sent even when nothing was found
    pub fn summary(&self) -> String {
        format!("Found {} new listings.", self.entries.len())
    }

    pub fn failure_notice(&self) -> Option<&'static str> {
        self.failed
            .then_some("Scraping failed during this run, some listings may be missing.")
    }
}

/// Per-channel reports of one scrape run, in configuration order
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub channels: Vec<ChannelReport>,
}

impl RunReport {
    /// Add the listings found for a channel.
    ///
    /// A channel configured twice is merged into one report; a listing already
    /// reported for that channel is not repeated.
    pub fn record_entries(&mut self, target: &ChannelTarget, entries: Vec<NotificationEntry>) {
        let report = self.channel_mut(target);
        for entry in entries {
            if report
                .entries
                .iter()
                .all(|e| e.record.external_id != entry.record.external_id)
            {
                report.entries.push(entry);
            }
        }
    }

    /// Flag a channel whose run hit an error
    pub fn record_failure(&mut self, target: &ChannelTarget) {
        self.channel_mut(target).failed = true;
    }

    pub fn total_found(&self) -> usize {
        self.channels.iter().map(|c| c.entries.len()).sum()
    }

    pub fn failed_channels(&self) -> usize {
        self.channels.iter().filter(|c| c.failed).count()
    }

    fn channel_mut(&mut self, target: &ChannelTarget) -> &mut ChannelReport {
        let index = match self
            .channels
            .iter()
            .position(|c| c.channel_id == target.channel_id)
        {
            Some(index) => index,
            None => {
                self.channels.push(ChannelReport::new(target));
                self.channels.len() - 1
            }
        };
        &mut self.channels[index]
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "channels={} found={} failed={}",
            self.channels.len(),
            self.total_found(),
            self.failed_channels()
        )
    }
}

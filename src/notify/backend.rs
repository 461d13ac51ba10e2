use async_trait::async_trait;

use super::grouping::ChannelReport;

/// Pluggable delivery of channel reports.
#[async_trait]
pub trait NotifyBackend: Send + Sync {
    /// Deliver one channel's summary, listings and failure notice.
    async fn deliver(&self, report: &ChannelReport) -> anyhow::Result<()>;
}

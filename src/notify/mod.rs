pub mod backend;
pub mod discord;
pub mod grouping;

pub use backend::NotifyBackend;
pub use grouping::RunReport;

use tracing::warn;

/// Hand every channel report to the backend; a failed delivery is logged and
/// does not stop the others.
pub async fn deliver_all(backend: &dyn NotifyBackend, report: &RunReport) {
    for channel in &report.channels {
        if let Err(e) = backend.deliver(channel).await {
            warn!(channel = %channel.channel_id, error = %e, "Failed to deliver channel notifications");
        }
    }
}

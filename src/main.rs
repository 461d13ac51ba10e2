mod config;
mod models;
mod notify;
mod reconcile;
mod scrapers;
mod spider;
mod store;

use config::Config;
use notify::discord::DiscordWebhook;
use scrapers::NepremicnineExtractor;
use store::SqliteStore;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("nepremicnine_scout=info")),
        )
        .init();

    info!("🏠 Nepremicnine Scout");

    let config = Config::from_env()?;
    config.log_summary();

    let store = SqliteStore::connect(&config.database_url).await?;
    store.create_schema().await?;

    let extractor = NepremicnineExtractor::new()?;

    // Channels without their own webhook fall back to DISCORD_WEBHOOK_URL;
    // with neither, the channel's report only reaches the log.
    let notifier = DiscordWebhook::new(config.discord_webhook_url.clone());

    let mut ticker = tokio::time::interval(config.scrape_interval);
    loop {
        ticker.tick().await;

        // The channel list is re-read at the start of every run
        match config::load_channels(&config.channels_file) {
            Ok(channels) => {
                let report =
                    spider::run_spider(&extractor, &store, &channels, config.max_pages).await;
                notify::deliver_all(&notifier, &report).await;
            }
            Err(e) => {
                let reason = format!("{e:#}");
                error!(error = %reason, "Channel list unavailable, skipping run");
            }
        }

        if config.run_once {
            break;
        }
    }

    info!("Application finished.");
    Ok(())
}

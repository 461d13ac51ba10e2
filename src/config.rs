use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tracing::info;

use crate::scrapers::ChannelTarget;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub channels_file: PathBuf,
    pub discord_webhook_url: Option<String>,
    pub scrape_interval: Duration,
    pub run_once: bool,
    pub max_pages: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let config = Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://nepremicnine_database.sqlite".to_string()),
            channels_file: env::var("CHANNELS_FILE")
                .unwrap_or_else(|_| "channels.txt".to_string())
                .into(),
            discord_webhook_url: env::var("DISCORD_WEBHOOK_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            scrape_interval: Duration::from_secs(
                env::var("SCRAPE_INTERVAL_SECS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .context("SCRAPE_INTERVAL_SECS must be a number of seconds")?,
            ),
            run_once: env::var("RUN_ONCE")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            max_pages: env::var("MAX_PAGES")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .context("MAX_PAGES must be a positive number")?,
        };

        if config.scrape_interval.is_zero() {
            anyhow::bail!("SCRAPE_INTERVAL_SECS must be greater than zero");
        }
        if config.max_pages == 0 {
            anyhow::bail!("MAX_PAGES must be greater than zero");
        }

        Ok(config)
    }

    pub fn log_summary(&self) {
        info!(
            database_url = %self.database_url,
            channels_file = %self.channels_file.display(),
            webhook = self.discord_webhook_url.is_some(),
            interval_secs = self.scrape_interval.as_secs(),
            run_once = self.run_once,
            max_pages = self.max_pages,
            "Configuration loaded"
        );
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Read the channel list file
pub fn load_channels(path: &Path) -> Result<Vec<ChannelTarget>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read channel list {}", path.display()))?;
    parse_channels(&content)
}

/// Parse `<channel_id> <start_url> [webhook_url]` lines.
///
/// Blank lines and lines starting with `#` are ignored.
pub fn parse_channels(content: &str) -> Result<Vec<ChannelTarget>> {
    let mut channels = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let (channel_id, start_url, webhook_url) = match fields.as_slice() {
            [channel_id, start_url] => (*channel_id, *start_url, None),
            [channel_id, start_url, webhook_url] => {
                (*channel_id, *start_url, Some(webhook_url.to_string()))
            }
            _ => anyhow::bail!(
                "Channel list line {}: expected `<channel_id> <start_url> [webhook_url]`",
                index + 1
            ),
        };

        if !start_url.starts_with("http://") && !start_url.starts_with("https://") {
            anyhow::bail!(
                "Channel list line {}: start url `{}` is not an http(s) url",
                index + 1,
                start_url
            );
        }

        channels.push(ChannelTarget {
            channel_id: channel_id.to_string(),
            start_url: start_url.to_string(),
            webhook_url,
        });
    }

    Ok(channels)
}

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::backend::NotifyBackend;
use super::grouping::ChannelReport;
use crate::models::NotificationEntry;

const EMBED_COLOR: u32 = 0x3498db;

/// Discord webhook notification backend.
pub struct DiscordWebhook {
    default_webhook_url: Option<String>,
    http: reqwest::Client,
}

impl DiscordWebhook {
    pub fn new(default_webhook_url: Option<String>) -> Self {
        Self {
            default_webhook_url,
            http: reqwest::Client::new(),
        }
    }

    async fn post(&self, webhook_url: &str, payload: &Value) -> anyhow::Result<()> {
        let resp = self.http.post(webhook_url).json(payload).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Discord webhook returned non-success");
            anyhow::bail!("Discord webhook returned {status}");
        }

        Ok(())
    }
}

fn format_price(amount: f64) -> String {
    format!("{amount:.2} €")
}

fn embed(entry: &NotificationEntry) -> Value {
    let record = &entry.record;
    let mut fields = vec![
        json!({ "name": "**Cena**", "value": format_price(entry.current_price()), "inline": true }),
        json!({ "name": "**Velikost**", "value": format!("{:.2} m²", record.size), "inline": true }),
        json!({
            "name": "**Zgrajeno leta**",
            "value": record.year.map(|y| y.to_string()).unwrap_or_else(|| "/".to_string()),
            "inline": true
        }),
        json!({
            "name": "**Nadstropje**",
            "value": record.floor.clone().unwrap_or_else(|| "/".to_string()),
            "inline": true
        }),
    ];

    let previous = entry.previous_prices();
    if !previous.is_empty() {
        let history = previous
            .iter()
            .map(|p| format_price(*p))
            .collect::<Vec<_>>()
            .join(", ");
        fields.push(json!({ "name": "**Prejšnje cene**", "value": history, "inline": false }));
    }

    let mut embed = json!({
        "title": record.title,
        "url": record.url,
        "description": record.description,
        "color": EMBED_COLOR,
        "fields": fields,
    });
    if let Some(image_url) = &record.image_url {
        embed["image"] = json!({ "url": image_url });
    }
    embed
}

/// Messages for one channel: the summary, one message per listing, then the
/// failure notice. A single embed per message stays well under Discord's
/// per-message size limit.
fn messages(report: &ChannelReport) -> Vec<Value> {
    let mut messages = vec![json!({ "content": report.summary() })];

    for entry in &report.entries {
        messages.push(json!({ "embeds": [embed(entry)] }));
    }

    if let Some(notice) = report.failure_notice() {
        messages.push(json!({ "content": notice }));
    }

    messages
}

#[async_trait]
impl NotifyBackend for DiscordWebhook {
    async fn deliver(&self, report: &ChannelReport) -> anyhow::Result<()> {
        let Some(webhook_url) = report
            .webhook_url
            .as_deref()
            .or(self.default_webhook_url.as_deref())
        else {
            info!(
                channel = %report.channel_id,
                summary = %report.summary(),
                "No webhook for channel, skipping delivery"
            );
            return Ok(());
        };

        let messages = messages(report);
        let mut failed = 0;
        for (index, payload) in messages.iter().enumerate() {
            if let Err(e) = self.post(webhook_url, payload).await {
                let error = format!("{e:#}");
                warn!(
                    channel = %report.channel_id,
                    message = index,
                    error = %error,
                    "Failed to post Discord message"
                );
                failed += 1;
            }
        }

        if failed > 0 {
            anyhow::bail!("{failed} of {} Discord messages failed", messages.len());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record;

    fn report(entries: Vec<NotificationEntry>, failed: bool) -> ChannelReport {
        ChannelReport {
            channel_id: "lj".to_string(),
            webhook_url: None,
            entries,
            failed,
        }
    }

    #[test]
    fn summary_is_sent_even_without_listings() {
        let msgs = messages(&report(Vec::new(), false));

        assert_eq!(msgs, vec![json!({ "content": "Found 0 new listings." })]);
    }

    #[test]
    fn each_listing_gets_its_own_message() {
        let entries: Vec<_> = (0..12)
            .map(|i| NotificationEntry {
                record: record(&i.to_string(), 100.0),
                prices: vec![100.0],
            })
            .collect();

        let msgs = messages(&report(entries, false));

        assert_eq!(msgs.len(), 13);
        for msg in &msgs[1..] {
            assert_eq!(msg["embeds"].as_array().unwrap().len(), 1);
        }
        assert_eq!(msgs[1]["embeds"][0]["title"], "Stanovanje 0");
        assert_eq!(msgs[12]["embeds"][0]["title"], "Stanovanje 11");
    }

    #[test]
    fn failure_notice_comes_last() {
        let msgs = messages(&report(Vec::new(), true));

        assert_eq!(msgs.len(), 2);
        assert!(msgs[1]["content"].as_str().unwrap().contains("failed"));
    }

    #[test]
    fn embed_lists_previous_prices() {
        let entry = NotificationEntry {
            record: record("123", 120.0),
            prices: vec![100.0, 110.0, 120.0],
        };

        let embed = embed(&entry);
        let fields = embed["fields"].as_array().unwrap();

        assert_eq!(fields[0]["value"], "120.00 €");
        assert_eq!(fields[4]["value"], "100.00 €, 110.00 €");
        assert!(embed.get("image").is_none());
    }

    #[test]
    fn first_sighting_has_no_history_field() {
        let mut rec = record("456", 80.0);
        rec.image_url = Some("https://img.example/456.jpg".to_string());
        let entry = NotificationEntry {
            record: rec,
            prices: vec![80.0],
        };

        let embed = embed(&entry);

        assert_eq!(embed["fields"].as_array().unwrap().len(), 4);
        assert_eq!(embed["image"]["url"], "https://img.example/456.jpg");
    }

    #[tokio::test]
    async fn failed_post_does_not_stop_later_messages() {
        let backend = DiscordWebhook::new(Some("not-a-url".to_string()));
        let entries = vec![NotificationEntry {
            record: record("123", 120.0),
            prices: vec![100.0, 120.0],
        }];

        let err = backend.deliver(&report(entries, true)).await.unwrap_err();

        assert_eq!(err.to_string(), "3 of 3 Discord messages failed");
    }

    #[tokio::test]
    async fn missing_webhook_skips_delivery() {
        let backend = DiscordWebhook::new(None);
        backend.deliver(&report(Vec::new(), false)).await.unwrap();
    }
}

use crate::models::ExtractionRecord;
use crate::scrapers::traits::ListingExtractor;
use crate::scrapers::types::{ExtractedPage, RejectedRecord};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};

const BASE_URL: &str = "https://www.nepremicnine.net";

/// Compiled selectors for the result list markup
struct Selectors {
    list: Selector,
    item: Selector,
    image: Selector,
    details: Selector,
    link: Selector,
    title: Selector,
    description: Selector,
    props: Selector,
    price: Selector,
    next_page: Selector,
}

impl Selectors {
    fn new() -> Result<Self> {
        Ok(Self {
            list: parse_selector("div.seznam")?,
            item: parse_selector("div.seznam div.col-md-6.col-md-12.position-relative")?,
            image: parse_selector("div.property-image a:nth-of-type(2) img")?,
            details: parse_selector("div.property-details")?,
            link: parse_selector("div.property-details > a")?,
            title: parse_selector("div.property-details > a h2")?,
            description: parse_selector(r#"p[itemprop="description"]"#)?,
            props: parse_selector(r#"ul[itemprop="disambiguatingDescription"] li"#)?,
            price: parse_selector(r#"meta[itemprop="price"]"#)?,
            next_page: parse_selector(r#"#pagination a.next, a[rel="next"]"#)?,
        })
    }
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector {css}: {e:?}"))
}

/// nepremicnine.net result list extractor
pub struct NepremicnineExtractor {
    client: Client,
    selectors: Selectors,
}

impl NepremicnineExtractor {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            selectors: Selectors::new()?,
        })
    }

    /// Extract every listing card of a result page.
    ///
    /// A card that cannot be read is reported in `rejected`; the page only
    /// fails as a whole when it has no result list at all.
    fn parse_page(&self, html: &str) -> Result<ExtractedPage> {
        let document = Html::parse_document(html);
        let cards: Vec<_> = document.select(&self.selectors.item).collect();
        debug!("Found {} listing cards in HTML", cards.len());

        let has_more_pages = document.select(&self.selectors.next_page).next().is_some();

        if cards.is_empty() && !has_more_pages {
            if document.select(&self.selectors.list).next().is_none() {
                anyhow::bail!("Page has no result list");
            }
        }

        let mut page = ExtractedPage {
            has_more_pages,
            ..ExtractedPage::default()
        };

        for (position, card) in cards.into_iter().enumerate() {
            match self.parse_card(card) {
                Ok(record) => {
                    page.records.insert(record.external_id.clone(), record);
                }
                Err(e) => page.rejected.push(RejectedRecord {
                    position,
                    reason: format!("{e:#}"),
                }),
            }
        }

        Ok(page)
    }

    fn parse_card(&self, card: ElementRef<'_>) -> Result<ExtractionRecord> {
        let s = &self.selectors;

        let details = card
            .select(&s.details)
            .next()
            .context("missing property details")?;

        let href = card
            .select(&s.link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .context("missing listing link")?;
        let url = absolute_url(href);
        let external_id = external_id_from_url(&url).context("listing link has no identifier")?;

        let title = card
            .select(&s.title)
            .next()
            .map(text_of)
            .filter(|t| !t.is_empty())
            .context("missing title")?;

        let image_url = card
            .select(&s.image)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(str::to_string);

        let description = details
            .select(&s.description)
            .next()
            .map(text_of)
            .unwrap_or_default();

        let props: Vec<String> = details.select(&s.props).map(text_of).collect();
        let size = props
            .first()
            .and_then(|p| parse_size(p))
            .context("missing or invalid size")?;
        let year = props.get(1).and_then(|p| p.trim().parse::<i32>().ok());
        let floor = props.get(2).filter(|p| !p.is_empty()).cloned();

        let price = details
            .select(&s.price)
            .next()
            .and_then(|m| m.value().attr("content"))
            .context("missing price")?
            .trim()
            .parse::<f64>()
            .context("invalid price")?;

        Ok(ExtractionRecord {
            external_id,
            title,
            image_url,
            description,
            price,
            size,
            year,
            floor,
            url,
        })
    }
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn absolute_url(href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        format!("{}/{}", BASE_URL, href.trim_start_matches('/'))
    }
}

/// The identifier is the last path segment of the listing URL
fn external_id_from_url(url: &str) -> Option<String> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && !segment.contains(':'))
        .map(str::to_string)
}

/// Parse sizes written like "54,30 m2". Dots are thousands separators only
/// when a decimal comma is present.
fn parse_size(text: &str) -> Option<f64> {
    let number = text.split_whitespace().next()?;
    let number = if number.contains(',') {
        number.replace('.', "").replace(',', ".")
    } else {
        number.to_string()
    };
    number.parse().ok()
}

#[async_trait]
impl ListingExtractor for NepremicnineExtractor {
    async fn fetch_page(&self, page_url: &str) -> Result<ExtractedPage> {
        debug!("Fetching URL: {}", page_url);

        let response = self
            .client
            .get(page_url)
            .send()
            .await
            .context("Failed to fetch result page")?;

        if !response.status().is_success() {
            warn!("nepremicnine.net returned status: {}", response.status());
            anyhow::bail!("Failed to fetch result page: {}", response.status());
        }

        let html = response.text().await.context("Failed to read response body")?;
        debug!("Downloaded {} bytes of HTML", html.len());

        let page = self.parse_page(&html)?;
        info!(
            listings = page.records.len(),
            rejected = page.rejected.len(),
            has_more_pages = page.has_more_pages,
            "Extracted result page"
        );
        Ok(page)
    }

    fn source_name(&self) -> &'static str {
        "nepremicnine.net"
    }
}

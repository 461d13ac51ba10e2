use crate::scrapers::types::ExtractedPage;
use anyhow::Result;
use async_trait::async_trait;

/// Common trait for listing sources
/// Implementations skip malformed individual listings and only fail when a
/// whole page is unusable.
#[async_trait]
pub trait ListingExtractor: Send + Sync {
    /// Fetch and extract one result page
    async fn fetch_page(&self, page_url: &str) -> Result<ExtractedPage>;

    /// URL of the given 1-based page of a result list
    fn page_url(&self, start_url: &str, page: usize) -> String {
        if page <= 1 {
            start_url.to_string()
        } else {
            format!("{}/{}/", start_url.trim_end_matches('/'), page)
        }
    }

    /// Get the name of the listing source
    fn source_name(&self) -> &'static str;
}

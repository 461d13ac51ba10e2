use crate::models::ExtractionRecord;
use crate::scrapers::traits::ListingExtractor;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use tracing::{debug, info, warn};

/// Listings gathered across all pages of one channel in one run
#[derive(Debug, Clone, Default)]
pub struct ExtractionBatch {
    /// Keyed by external identifier, ordered by first sighting
    pub records: IndexMap<String, ExtractionRecord>,
    pub pages_fetched: usize,
    pub rejected: usize,
}

impl ExtractionBatch {
    /// Merge one page into the batch.
    ///
    /// An identifier seen again on a later page keeps its first-seen position
    /// but takes the later page's record (last write wins).
    pub fn merge_page(&mut self, records: IndexMap<String, ExtractionRecord>) {
        for (external_id, record) in records {
            if let Some(previous) = self.records.insert(external_id, record) {
                debug!(
                    external_id = %previous.external_id,
                    "Listing repeated on a later page, keeping the later record"
                );
            }
        }
        self.pages_fetched += 1;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// Walk a result list page by page until the source reports no further pages.
///
/// Pages are requested strictly in order. `max_pages` bounds the walk in case
/// a source keeps announcing more pages.
pub async fn accumulate(
    extractor: &dyn ListingExtractor,
    start_url: &str,
    max_pages: usize,
) -> Result<ExtractionBatch> {
    let mut batch = ExtractionBatch::default();
    let mut page = 1;

    loop {
        let url = extractor.page_url(start_url, page);
        debug!(page, url = %url, "Fetching result page");

        let extracted = extractor
            .fetch_page(&url)
            .await
            .with_context(|| format!("Failed to extract page {page} ({url})"))?;

        for rejected in &extracted.rejected {
            warn!(
                page,
                position = rejected.position,
                reason = %rejected.reason,
                "Skipped malformed listing"
            );
        }
        batch.rejected += extracted.rejected.len();

        let has_more = extracted.has_more_pages;
        batch.merge_page(extracted.records);

        if !has_more {
            break;
        }
        if page >= max_pages {
            warn!(max_pages, "Stopped paging at the configured page limit");
            break;
        }
        page += 1;
    }

    info!(
        source = extractor.source_name(),
        pages = batch.pages_fetched,
        listings = batch.len(),
        rejected = batch.rejected,
        "Extraction batch complete"
    );

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record;
    use crate::scrapers::types::{ExtractedPage, RejectedRecord};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Serves prepared pages and remembers which URLs were requested
    struct PagedExtractor {
        pages: Vec<ExtractedPage>,
        requested: Mutex<Vec<String>>,
    }

    impl PagedExtractor {
        fn new(pages: Vec<ExtractedPage>) -> Self {
            Self {
                pages,
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ListingExtractor for PagedExtractor {
        async fn fetch_page(&self, page_url: &str) -> Result<ExtractedPage> {
            let mut requested = self.requested.lock().unwrap();
            let index = requested.len();
            requested.push(page_url.to_string());
            self.pages
                .get(index)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no page {}", index + 1))
        }

        fn source_name(&self) -> &'static str {
            "paged"
        }
    }

    #[tokio::test]
    async fn later_page_wins_on_repeated_identifier() {
        let extractor = PagedExtractor::new(vec![
            ExtractedPage::new(vec![record("A", 1.0), record("B", 2.0)], true),
            ExtractedPage::new(vec![record("B", 3.0)], false),
        ]);

        let batch = accumulate(&extractor, "https://example.com/list/", 10)
            .await
            .unwrap();

        assert_eq!(batch.pages_fetched, 2);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.records["A"].price, 1.0);
        assert_eq!(batch.records["B"].price, 3.0);
        let order: Vec<_> = batch.records.keys().cloned().collect();
        assert_eq!(order, vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test]
    async fn pages_are_requested_in_order() {
        let extractor = PagedExtractor::new(vec![
            ExtractedPage::new(vec![record("A", 1.0)], true),
            ExtractedPage::new(vec![record("B", 2.0)], true),
            ExtractedPage::new(vec![record("C", 3.0)], false),
        ]);

        accumulate(&extractor, "https://example.com/list/", 10)
            .await
            .unwrap();

        let requested = extractor.requested.lock().unwrap().clone();
        assert_eq!(
            requested,
            vec![
                "https://example.com/list/".to_string(),
                "https://example.com/list/2/".to_string(),
                "https://example.com/list/3/".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn stops_at_page_limit() {
        let extractor = PagedExtractor::new(vec![
            ExtractedPage::new(vec![record("A", 1.0)], true),
            ExtractedPage::new(vec![record("B", 2.0)], true),
            ExtractedPage::new(vec![record("C", 3.0)], true),
        ]);

        let batch = accumulate(&extractor, "https://example.com/list/", 2)
            .await
            .unwrap();

        assert_eq!(batch.pages_fetched, 2);
        assert!(!batch.records.contains_key("C"));
    }

    #[tokio::test]
    async fn rejected_records_are_counted_not_fatal() {
        let mut page = ExtractedPage::new(vec![record("A", 1.0)], false);
        page.rejected.push(RejectedRecord {
            position: 1,
            reason: "missing price".to_string(),
        });
        let extractor = PagedExtractor::new(vec![page]);

        let batch = accumulate(&extractor, "https://example.com/list/", 10)
            .await
            .unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch.rejected, 1);
    }

    #[tokio::test]
    async fn unusable_page_fails_the_batch() {
        let extractor = PagedExtractor::new(vec![ExtractedPage::new(
            vec![record("A", 1.0)],
            true,
        )]);

        let result = accumulate(&extractor, "https://example.com/list/", 10).await;

        assert!(result.is_err());
    }
}

use crate::models::ExtractionRecord;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One run target: a notification channel and the result list it watches
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelTarget {
    /// Channel identifier used in logs and reports
    pub channel_id: String,
    /// First page of the search result list
    pub start_url: String,
    /// Webhook overriding the default one for this channel
    pub webhook_url: Option<String>,
}

/// A listing that could not be extracted from a page
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRecord {
    /// Position of the item on its page
    pub position: usize,
    pub reason: String,
}

/// Result of extracting a single page
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    /// Extracted listings keyed by external identifier, in page order
    pub records: IndexMap<String, ExtractionRecord>,
    /// Items skipped because they were malformed
    pub rejected: Vec<RejectedRecord>,
    /// Whether the source announced a following page
    pub has_more_pages: bool,
}

impl ExtractedPage {
    pub fn new(records: Vec<ExtractionRecord>, has_more_pages: bool) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.external_id.clone(), record))
                .collect(),
            rejected: Vec::new(),
            has_more_pages,
        }
    }
}

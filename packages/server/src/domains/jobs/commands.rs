//! Typed payloads of the two queue job kinds.

use serde::{Deserialize, Serialize};

use crate::common::PostingId;
use crate::domains::scraping::Source;
use crate::kernel::jobs::{CommandMeta, JobKind};

/// Scrape one source and chain an embed job for what it found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeSourceJob {
    pub source: String,
}

impl ScrapeSourceJob {
    pub fn new(source: Source) -> Self {
        Self {
            source: source.as_str().to_string(),
        }
    }
}

impl CommandMeta for ScrapeSourceJob {
    const KIND: JobKind = JobKind::Scrape;

    /// One pending scrape per source.
    fn idempotency_key(&self) -> Option<String> {
        Some(format!("scrape:{}", self.source.trim().to_ascii_uppercase()))
    }
}

/// Embed the given postings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedPostingsJob {
    pub posting_ids: Vec<PostingId>,
    /// Overrides the configured chunk size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,
}

impl EmbedPostingsJob {
    pub fn new(posting_ids: Vec<PostingId>) -> Self {
        Self {
            posting_ids,
            chunk_size: None,
        }
    }
}

impl CommandMeta for EmbedPostingsJob {
    const KIND: JobKind = JobKind::Embed;
}

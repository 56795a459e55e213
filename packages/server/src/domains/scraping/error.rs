use thiserror::Error;

/// Failures that abort a whole scrape run.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Caller asked for a source we have no parser for
    #[error("unknown source: {0}")]
    UnknownSource(String),

    /// The listing page could not be fetched at all
    #[error("failed to fetch {source_name}: {message}")]
    Fetch {
        source_name: String,
        message: String,
    },
}

impl ScrapeError {
    /// Whether the queue should try the run again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScrapeError::Fetch { .. })
    }
}

/// A single listing dropped during normalization. Logged, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSkip {
    pub reason: &'static str,
    /// Raw href as found on the page, if there was one
    pub url: Option<String>,
}

impl ParseSkip {
    pub(crate) fn new(reason: &'static str, url: Option<&str>) -> Self {
        Self {
            reason,
            url: url.map(str::to_string),
        }
    }
}

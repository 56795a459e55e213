//! Source Scraper: turns one job board's listing page into postings.

pub mod actions;
pub mod error;
pub mod listing;
pub mod sources;

pub use actions::{parse_listings, scrape, ParsedPage};
pub use error::{ParseSkip, ScrapeError};
pub use listing::{dedupe_by_url, RawListing, ScrapeResult};
pub use sources::{Source, SourceSpec};

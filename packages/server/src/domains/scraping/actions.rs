//! Scrape entrypoint: fetch one source, normalize, persist.

use std::time::Instant;

use tracing::{debug, info, instrument, warn};
use url::Url;

use super::error::{ParseSkip, ScrapeError};
use super::listing::{dedupe_by_url, ScrapeResult};
use super::sources::Source;
use crate::domains::postings::NewPosting;
use crate::kernel::ServerDeps;

/// Normalized listings from one page, plus what was dropped.
#[derive(Debug, Default)]
pub struct ParsedPage {
    pub postings: Vec<NewPosting>,
    pub skipped: Vec<ParseSkip>,
}

/// Parse a listing page for `source`. Relative links resolve against `base`.
pub fn parse_listings(source: Source, base: &Url, html: &str) -> ParsedPage {
    let mut page = ParsedPage::default();
    for raw in source.parse_html(html) {
        match raw.normalize(base, source.site_code()) {
            Ok(posting) => page.postings.push(posting),
            Err(skip) => page.skipped.push(skip),
        }
    }
    page.postings = dedupe_by_url(page.postings);
    page
}

/// Scrape one source into the Job Store.
///
/// Fails only when the source is unknown or its listing page cannot be
/// fetched. Records that fail to normalize or to upsert are logged and left
/// out of the result.
#[instrument(skip(deps), fields(source = %source_name))]
pub async fn scrape(source_name: &str, deps: &ServerDeps) -> Result<ScrapeResult, ScrapeError> {
    let source = Source::parse(source_name)?;
    let listing_url = source.listing_url();
    let started = Instant::now();

    let fetch_error = |message: String| ScrapeError::Fetch {
        source_name: source.as_str().to_string(),
        message,
    };

    info!(url = listing_url, "Fetching listing page");
    let html = deps
        .page_fetcher
        .fetch_html(listing_url)
        .await
        .map_err(|e| fetch_error(format!("{e:#}")))?;
    let base = Url::parse(listing_url).map_err(|e| fetch_error(e.to_string()))?;

    let page = parse_listings(source, &base, &html);
    for skip in &page.skipped {
        debug!(reason = skip.reason, url = ?skip.url, "Skipping listing");
    }
    info!(
        parsed = page.postings.len(),
        skipped = page.skipped.len(),
        "Parsed listing page"
    );

    let mut result = ScrapeResult::default();
    for posting in &page.postings {
        match deps.store.upsert_posting(posting).await {
            Ok(id) => result.inserted_or_updated_ids.push(id),
            Err(e) => warn!(
                url = %posting.source_url,
                error = %e,
                "Failed to upsert posting, skipping"
            ),
        }
    }
    result.count = result.inserted_or_updated_ids.len();

    info!(
        count = result.count,
        failed = page.postings.len() - result.count,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Scrape finished"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listings_two_good_one_missing_title() {
        let html = r#"<table>
            <tr class="job" data-id="1"><td><h2>Rust Engineer</h2>
                <a class="preventLink" href="/remote-jobs/1"></a></td></tr>
            <tr class="job" data-id="2"><td><h2></h2>
                <a class="preventLink" href="/remote-jobs/2"></a></td></tr>
            <tr class="job" data-id="3"><td><h2>Go Engineer</h2>
                <a class="preventLink" href="/remote-jobs/3"></a></td></tr>
        </table>"#;
        let base = Url::parse(Source::RemoteOk.listing_url()).unwrap();

        let page = parse_listings(Source::RemoteOk, &base, html);

        let urls: Vec<&str> = page.postings.iter().map(|p| p.source_url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://remoteok.com/remote-jobs/1",
                "https://remoteok.com/remote-jobs/3"
            ]
        );
        assert_eq!(page.skipped, vec![ParseSkip::new("missing title", Some("/remote-jobs/2"))]);
    }

    #[test]
    fn test_parse_listings_dedupes_relative_and_absolute_forms() {
        let html = r#"<section class="jobs"><ul>
            <li><a href="/remote-jobs/a"><span class="title">First</span></a></li>
            <li><a href="https://weworkremotely.com/remote-jobs/a"><span class="title">Again</span></a></li>
        </ul></section>"#;
        let base = Url::parse(Source::WeWorkRemotely.listing_url()).unwrap();

        let page = parse_listings(Source::WeWorkRemotely, &base, html);

        assert_eq!(page.postings.len(), 1);
        assert_eq!(page.postings[0].title, "First");
        assert_eq!(page.postings[0].source_site, "WEWORKREMOTELY");
    }
}

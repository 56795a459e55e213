//! Raw listings as parsed from a page, and their normalization into
//! [`NewPosting`] records.

use std::collections::HashSet;

use serde::Serialize;
use url::Url;

use super::error::ParseSkip;
use crate::common::PostingId;
use crate::domains::postings::NewPosting;

/// Fields lifted from one listing element, untrimmed and unvalidated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawListing {
    pub title: Option<String>,
    pub href: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub salary: Option<String>,
    pub tags: Vec<String>,
}

/// Outcome of one scrape run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScrapeResult {
    /// Postings successfully upserted
    pub count: usize,
    pub inserted_or_updated_ids: Vec<PostingId>,
}

impl RawListing {
    /// Validate and normalize against the page the listing was found on.
    ///
    /// A listing needs a non-empty title and an href that resolves to an
    /// http(s) URL. Optional fields that are blank become `None`.
    pub fn normalize(&self, base: &Url, source_site: &str) -> Result<NewPosting, ParseSkip> {
        let href = non_empty(self.href.as_deref());

        let Some(title) = single_line(self.title.as_deref()) else {
            return Err(ParseSkip::new("missing title", href));
        };
        let Some(href) = href else {
            return Err(ParseSkip::new("missing url", None));
        };

        let url = base
            .join(href)
            .map_err(|_| ParseSkip::new("invalid url", Some(href)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ParseSkip::new("unsupported url scheme", Some(href)));
        }

        Ok(NewPosting::builder()
            .title(title)
            .company(single_line(self.company.as_deref()))
            .location(single_line(self.location.as_deref()))
            .description(non_empty(self.description.as_deref()).map(str::to_string))
            .salary(single_line(self.salary.as_deref()))
            .tags(tag_set(&self.tags))
            .source_url(String::from(url))
            .source_site(source_site)
            .build())
    }
}

/// Keep the first posting for each URL, preserving order.
pub fn dedupe_by_url(postings: Vec<NewPosting>) -> Vec<NewPosting> {
    let mut seen = HashSet::new();
    postings
        .into_iter()
        .filter(|posting| seen.insert(posting.source_url.clone()))
        .collect()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Trimmed with internal whitespace runs collapsed to one space.
fn single_line(value: Option<&str>) -> Option<String> {
    non_empty(value).map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Trimmed, blanks dropped, first occurrence kept.
fn tag_set(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .filter_map(|tag| single_line(Some(tag)))
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://remoteok.com/").unwrap()
    }

    fn raw(title: &str, href: &str) -> RawListing {
        RawListing {
            title: Some(title.to_string()),
            href: Some(href.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_resolves_relative_href() {
        let posting = raw("  Rust Engineer ", "/remote-jobs/1")
            .normalize(&base(), "REMOTEOK")
            .unwrap();

        assert_eq!(posting.title, "Rust Engineer");
        assert_eq!(posting.source_url, "https://remoteok.com/remote-jobs/1");
        assert_eq!(posting.source_site, "REMOTEOK");
    }

    #[test]
    fn test_normalize_keeps_absolute_href() {
        let posting = raw("Rust Engineer", "https://jobs.example.com/a?b=1")
            .normalize(&base(), "REMOTEOK")
            .unwrap();
        assert_eq!(posting.source_url, "https://jobs.example.com/a?b=1");
    }

    #[test]
    fn test_normalize_blank_optionals_become_none() {
        let listing = RawListing {
            company: Some("   ".into()),
            location: Some("".into()),
            description: Some("\n".into()),
            ..raw("Title", "/x")
        };
        let posting = listing.normalize(&base(), "REMOTEOK").unwrap();

        assert_eq!(posting.company, None);
        assert_eq!(posting.location, None);
        assert_eq!(posting.description, None);
        assert_eq!(posting.salary, None);
        assert!(posting.tags.is_empty());
    }

    #[test]
    fn test_normalize_rejects_missing_title_or_url() {
        let skip = raw("   ", "/remote-jobs/1").normalize(&base(), "REMOTEOK").unwrap_err();
        assert_eq!(skip.reason, "missing title");
        assert_eq!(skip.url.as_deref(), Some("/remote-jobs/1"));

        let skip = raw("Title", "  ").normalize(&base(), "REMOTEOK").unwrap_err();
        assert_eq!(skip.reason, "missing url");
    }

    #[test]
    fn test_normalize_rejects_non_http_scheme() {
        let skip = raw("Title", "mailto:jobs@example.com")
            .normalize(&base(), "REMOTEOK")
            .unwrap_err();
        assert_eq!(skip.reason, "unsupported url scheme");
    }

    #[test]
    fn test_tags_are_an_ordered_set() {
        let listing = RawListing {
            tags: vec![
                " Rust ".into(),
                "".into(),
                "Go".into(),
                "Rust".into(),
                "Remote  First".into(),
            ],
            ..raw("Title", "/x")
        };
        let posting = listing.normalize(&base(), "REMOTEOK").unwrap();
        assert_eq!(posting.tags, vec!["Rust", "Go", "Remote First"]);
    }

    #[test]
    fn test_dedupe_first_occurrence_wins() {
        let a = raw("First", "/1").normalize(&base(), "REMOTEOK").unwrap();
        let b = raw("Second", "/2").normalize(&base(), "REMOTEOK").unwrap();
        let a_again = raw("Dupe", "/1").normalize(&base(), "REMOTEOK").unwrap();

        let deduped = dedupe_by_url(vec![a, b, a_again]);
        let titles: Vec<&str> = deduped.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second"]);
    }
}

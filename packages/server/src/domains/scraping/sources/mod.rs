//! Per-site listing parsers and the table mapping source names to them.
//!
//! Adding a source means adding a parser module, a [`Source`] variant and
//! one [`SourceSpec`] entry. Parsers are plain functions from HTML to raw
//! listings; everything after that (normalization, dedupe, persistence) is
//! shared.

mod remoteok;
mod wellfound;
mod weworkremotely;

use std::fmt;
use std::str::FromStr;

use scraper::{ElementRef, Selector};

use super::error::ScrapeError;
use super::listing::RawListing;

/// A supported job board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    RemoteOk,
    WeWorkRemotely,
    Wellfound,
}

/// How to scrape one source.
pub struct SourceSpec {
    pub source: Source,
    pub listing_url: &'static str,
    pub parse: fn(&str) -> Vec<RawListing>,
}

static SOURCES: [SourceSpec; 3] = [
    SourceSpec {
        source: Source::RemoteOk,
        listing_url: "https://remoteok.com/",
        parse: remoteok::parse,
    },
    SourceSpec {
        source: Source::WeWorkRemotely,
        listing_url: "https://weworkremotely.com/remote-jobs",
        parse: weworkremotely::parse,
    },
    SourceSpec {
        source: Source::Wellfound,
        listing_url: "https://wellfound.com/jobs",
        parse: wellfound::parse,
    },
];

impl Source {
    pub const ALL: [Source; 3] = [Source::RemoteOk, Source::WeWorkRemotely, Source::Wellfound];

    /// Case-insensitive lookup by name (`remoteok`, `WeWorkRemotely`, ...).
    pub fn parse(name: &str) -> Result<Self, ScrapeError> {
        let wanted = name.trim();
        Self::ALL
            .into_iter()
            .find(|source| source.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ScrapeError::UnknownSource(name.to_string()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::RemoteOk => "remoteok",
            Source::WeWorkRemotely => "weworkremotely",
            Source::Wellfound => "wellfound",
        }
    }

    /// Code stored in `postings.source_site`.
    pub fn site_code(&self) -> &'static str {
        match self {
            Source::RemoteOk => "REMOTEOK",
            Source::WeWorkRemotely => "WEWORKREMOTELY",
            Source::Wellfound => "WELLFOUND",
        }
    }

    pub fn spec(&self) -> &'static SourceSpec {
        match self {
            Source::RemoteOk => &SOURCES[0],
            Source::WeWorkRemotely => &SOURCES[1],
            Source::Wellfound => &SOURCES[2],
        }
    }

    pub fn listing_url(&self) -> &'static str {
        self.spec().listing_url
    }

    pub fn parse_html(&self, html: &str) -> Vec<RawListing> {
        (self.spec().parse)(html)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::parse(s)
    }
}

// =============================================================================
// Element helpers shared by the parsers
// =============================================================================

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Text of the first non-blank match among `css`.
fn first_text(element: ElementRef<'_>, css: &str) -> Option<String> {
    let selector = selector(css)?;
    element
        .select(&selector)
        .map(element_text)
        .find(|text| !text.is_empty())
}

/// Texts of all non-blank matches, joined by a space.
fn joined_text(element: ElementRef<'_>, css: &str) -> Option<String> {
    let selector = selector(css)?;
    let parts: Vec<String> = element
        .select(&selector)
        .map(element_text)
        .filter(|text| !text.is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}

/// First non-blank `attr` among the matches of `css`.
fn first_attr(element: ElementRef<'_>, css: &str, attr: &str) -> Option<String> {
    let selector = selector(css)?;
    element
        .select(&selector)
        .filter_map(|el| el.value().attr(attr))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn all_texts(element: ElementRef<'_>, css: &str) -> Vec<String> {
    match selector(css) {
        Some(selector) => element.select(&selector).map(element_text).collect(),
        None => Vec::new(),
    }
}

fn has_class(element: ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(Source::parse("remoteok").unwrap(), Source::RemoteOk);
        assert_eq!(Source::parse(" WeWorkRemotely ").unwrap(), Source::WeWorkRemotely);
        assert_eq!("WELLFOUND".parse::<Source>().unwrap(), Source::Wellfound);
    }

    #[test]
    fn test_unknown_source() {
        let err = Source::parse("monster").unwrap_err();
        assert!(matches!(err, ScrapeError::UnknownSource(ref name) if name == "monster"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_spec_table_matches_variants() {
        for source in Source::ALL {
            assert_eq!(source.spec().source, source);
            assert!(url::Url::parse(source.listing_url()).is_ok());
        }
    }
}

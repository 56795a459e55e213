//! wellfound.com: job cards are anchors linking into `/jobs/`.

use scraper::Html;

use super::{all_texts, first_text, selector};
use crate::domains::scraping::listing::RawListing;

pub(super) fn parse(html: &str) -> Vec<RawListing> {
    let document = Html::parse_document(html);
    let Some(anchors) = selector("a[href*=\"/jobs/\"]") else {
        return Vec::new();
    };

    document
        .select(&anchors)
        .map(|anchor| RawListing {
            title: first_text(anchor, "[data-test=\"job-title\"]")
                .or_else(|| first_text(anchor, ".job-title"))
                .or_else(|| Some(anchor.text().collect::<String>())),
            href: anchor.value().attr("href").map(str::to_string),
            company: first_text(anchor, "[data-test=\"company-name\"]")
                .or_else(|| first_text(anchor, ".company-name")),
            location: first_text(anchor, ".location"),
            description: None,
            salary: None,
            tags: all_texts(anchor, ".tags .tag"),
        })
        .collect()
}

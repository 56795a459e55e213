//! weworkremotely.com: `<li>` entries inside `section.jobs`.

use scraper::Html;

use super::{all_texts, first_attr, first_text, has_class, joined_text, selector};
use crate::domains::scraping::listing::RawListing;

pub(super) fn parse(html: &str) -> Vec<RawListing> {
    let document = Html::parse_document(html);
    let Some(items) = selector("section.jobs li") else {
        return Vec::new();
    };

    document
        .select(&items)
        .filter(|item| !has_class(*item, "view-all") && !has_class(*item, "heading"))
        .map(|item| RawListing {
            title: first_text(item, "span.title").or_else(|| first_text(item, "a")),
            href: first_attr(item, "a", "href"),
            company: first_text(item, "span.company"),
            location: first_text(item, "span.region"),
            description: joined_text(item, "div.listing-container p"),
            salary: None,
            tags: all_texts(item, "span.tags a"),
        })
        .collect()
}

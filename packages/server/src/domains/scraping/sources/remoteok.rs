//! remoteok.com: one `<tr class="job" data-id=..>` row per listing.

use scraper::Html;

use super::{all_texts, first_attr, first_text, has_class, joined_text, selector};
use crate::domains::scraping::listing::RawListing;

pub(super) fn parse(html: &str) -> Vec<RawListing> {
    let document = Html::parse_document(html);
    let Some(rows) = selector("tr.job, tr[data-id]") else {
        return Vec::new();
    };

    document
        .select(&rows)
        .filter(|row| !has_class(*row, "header"))
        .map(|row| RawListing {
            title: first_text(row, "h2"),
            href: first_attr(row, "a.preventLink", "href")
                .or_else(|| first_attr(row, "td.company a", "href"))
                .or_else(|| first_attr(row, "a[href^=\"/remote-jobs/\"]", "href")),
            company: first_text(row, ".companyLink, .company h3"),
            location: first_text(row, ".location, [class*=\"location\"]"),
            description: joined_text(row, ".description, .markdown"),
            salary: first_text(row, ".salary, [class*=\"salary\"]"),
            tags: all_texts(row, ".tags a, .tag"),
        })
        .collect()
}

//! Test fixtures for creating test data.
//!
//! These fixtures go through the Job Store trait directly.

#![allow(dead_code)]

use jobfeed_core::common::PostingId;
use jobfeed_core::domains::postings::{JobStore, MemoryJobStore, NewPosting};

/// A remoteok listing page with the given `(id, title)` rows. An empty title
/// renders an `<h2>` with no text.
pub fn remoteok_page(rows: &[(&str, &str)]) -> String {
    let rows: String = rows
        .iter()
        .map(|(id, title)| {
            format!(
                r#"<tr class="job" data-id="{id}"><td>
                    <h2>{title}</h2>
                    <a class="companyLink">Company {id}</a>
                    <a class="preventLink" href="/remote-jobs/{id}"></a>
                    <div class="tags"><a>rust</a><a>remote</a></div>
                </td></tr>"#
            )
        })
        .collect();

    format!("<html><body><table>{rows}</table></body></html>")
}

pub fn remoteok_url(id: &str) -> String {
    format!("https://remoteok.com/remote-jobs/{id}")
}

pub fn new_posting(slug: &str, title: &str) -> NewPosting {
    NewPosting::builder()
        .title(title)
        .company(Some(format!("{title} Inc")))
        .description(Some(format!("We are hiring: {title}")))
        .source_url(remoteok_url(slug))
        .source_site("REMOTEOK")
        .build()
}

/// Insert postings titled `Posting 0..count`, returning IDs in insert order.
pub async fn seed_postings(store: &MemoryJobStore, count: usize) -> Vec<PostingId> {
    let mut ids = Vec::with_capacity(count);
    for n in 0..count {
        let id = store
            .upsert_posting(&new_posting(&format!("seed-{n}"), &format!("Posting {n}")))
            .await
            .expect("Failed to seed posting");
        ids.push(id);
    }
    ids
}

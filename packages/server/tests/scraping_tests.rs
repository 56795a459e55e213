//! Integration tests for the Source Scraper against the in-memory store.

mod common;

use std::collections::HashSet;

use crate::common::{remoteok_page, remoteok_url};
use jobfeed_core::domains::scraping::{scrape, ScrapeError, Source};
use jobfeed_core::kernel::test_dependencies::MockPageFetcher;
use jobfeed_core::kernel::TestDependencies;

fn with_remoteok_page(html: String) -> TestDependencies {
    TestDependencies::new()
        .mock_fetcher(MockPageFetcher::new().with_page(Source::RemoteOk.listing_url(), html))
}

#[tokio::test]
async fn two_good_listings_and_one_without_title_yields_two() {
    let test_deps = with_remoteok_page(remoteok_page(&[
        ("1", "Rust Engineer"),
        ("2", ""),
        ("3", "Platform Engineer"),
    ]));
    let deps = test_deps.server_deps();

    let result = scrape("remoteok", &deps).await.unwrap();

    assert_eq!(result.count, 2);
    assert_eq!(result.inserted_or_updated_ids.len(), 2);

    let urls: Vec<String> = test_deps
        .store
        .postings()
        .await
        .into_iter()
        .map(|p| p.source_url)
        .collect();
    assert_eq!(urls, vec![remoteok_url("1"), remoteok_url("3")]);
}

#[tokio::test]
async fn duplicate_urls_within_a_run_are_persisted_once() {
    let test_deps = with_remoteok_page(remoteok_page(&[
        ("7", "First Title"),
        ("8", "Other"),
        ("7", "Second Title"),
    ]));
    let deps = test_deps.server_deps();

    let result = scrape("remoteok", &deps).await.unwrap();

    assert_eq!(result.count, 2);
    let unique: HashSet<_> = result.inserted_or_updated_ids.iter().collect();
    assert_eq!(unique.len(), 2);

    let postings = test_deps.store.postings().await;
    assert_eq!(postings.len(), 2);
    assert_eq!(postings[0].title, "First Title");
}

#[tokio::test]
async fn rescraping_updates_instead_of_duplicating() {
    let test_deps = with_remoteok_page(remoteok_page(&[("1", "Rust Engineer"), ("2", "Go Engineer")]));
    let deps = test_deps.server_deps();

    let first = scrape("remoteok", &deps).await.unwrap();
    let second = scrape("REMOTEOK", &deps).await.unwrap();

    assert_eq!(first.inserted_or_updated_ids, second.inserted_or_updated_ids);
    assert_eq!(test_deps.store.posting_count().await, 2);
}

#[tokio::test]
async fn source_names_are_case_insensitive() {
    let test_deps = with_remoteok_page(remoteok_page(&[("1", "Rust Engineer")]));
    let deps = test_deps.server_deps();

    let result = scrape(" RemoteOK ", &deps).await.unwrap();

    assert_eq!(result.count, 1);
    assert_eq!(test_deps.store.postings().await[0].source_site, "REMOTEOK");
}

#[tokio::test]
async fn unknown_source_fails_without_fetching() {
    let test_deps = TestDependencies::new();
    let deps = test_deps.server_deps();

    let err = scrape("monster", &deps).await.unwrap_err();

    assert!(matches!(err, ScrapeError::UnknownSource(ref name) if name == "monster"));
    assert!(!err.is_retryable());
    assert!(test_deps.page_fetcher.calls().is_empty());
}

#[tokio::test]
async fn unreachable_source_is_a_retryable_fetch_error() {
    let test_deps = TestDependencies::new()
        .mock_fetcher(MockPageFetcher::new().with_failure(Source::Wellfound.listing_url()));
    let deps = test_deps.server_deps();

    let err = scrape("wellfound", &deps).await.unwrap_err();

    match &err {
        ScrapeError::Fetch { source_name, message } => {
            assert_eq!(source_name, "wellfound");
            assert!(message.contains("connection refused"));
        }
        other => panic!("expected fetch error, got {other:?}"),
    }
    assert!(err.is_retryable());
    assert_eq!(test_deps.store.posting_count().await, 0);
}

#[tokio::test]
async fn one_failing_upsert_does_not_abort_the_run() {
    let test_deps = with_remoteok_page(remoteok_page(&[
        ("1", "Rust Engineer"),
        ("2", "Broken Row"),
        ("3", "Go Engineer"),
    ]));
    test_deps.store.fail_posting_upserts_for(remoteok_url("2")).await;
    let deps = test_deps.server_deps();

    let result = scrape("remoteok", &deps).await.unwrap();

    assert_eq!(result.count, 2);
    let titles: Vec<String> = test_deps
        .store
        .postings()
        .await
        .into_iter()
        .map(|p| p.title)
        .collect();
    assert_eq!(titles, vec!["Rust Engineer", "Go Engineer"]);
}

#[tokio::test]
async fn parsed_fields_are_normalized() {
    let test_deps = with_remoteok_page(remoteok_page(&[("42", "  Senior   Rust Engineer ")]));
    let deps = test_deps.server_deps();

    scrape("remoteok", &deps).await.unwrap();

    let posting = test_deps.store.postings().await.remove(0);
    assert_eq!(posting.title, "Senior Rust Engineer");
    assert_eq!(posting.company.as_deref(), Some("Company 42"));
    assert_eq!(posting.tags, vec!["rust", "remote"]);
    assert_eq!(posting.location, None);
    assert_eq!(posting.salary, None);
}

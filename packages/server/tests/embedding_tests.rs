//! Integration tests for the Embedding Batch Processor.

mod common;

use crate::common::seed_postings;
use jobfeed_core::common::PostingId;
use jobfeed_core::domains::embeddings::{
    embed_jobs_by_ids, embed_new_jobs, embed_user, EmbedSummary, UserEmbeddingError,
};
use jobfeed_core::domains::postings::{JobStore, UserProfile};
use jobfeed_core::kernel::test_dependencies::MockEmbeddingService;
use jobfeed_core::kernel::TestDependencies;

#[tokio::test]
async fn empty_input_makes_no_calls() {
    let test_deps = TestDependencies::new();
    let deps = test_deps.server_deps();

    let summary = embed_jobs_by_ids(&[], None, &deps).await;

    assert_eq!(summary, EmbedSummary::default());
    assert_eq!(test_deps.embedding_service.call_count(), 0);
}

#[tokio::test]
async fn embed_new_jobs_embeds_every_missing_posting() {
    let test_deps = TestDependencies::new();
    let deps = test_deps.server_deps();
    seed_postings(&test_deps.store, 3).await;

    let summary = embed_new_jobs(Some(5), &deps).await.unwrap();

    assert_eq!(summary.embedded, 3);
    assert!(summary.failures.is_empty());
    assert_eq!(test_deps.store.embedding_count().await, 3);
}

#[tokio::test]
async fn embed_new_jobs_takes_oldest_first_up_to_limit() {
    let test_deps = TestDependencies::new();
    let deps = test_deps.server_deps();
    let ids = seed_postings(&test_deps.store, 4).await;

    let summary = embed_new_jobs(Some(2), &deps).await.unwrap();

    assert_eq!(summary.embedded, 2);
    assert!(test_deps.store.embedding(ids[0]).await.is_some());
    assert!(test_deps.store.embedding(ids[1]).await.is_some());
    assert!(test_deps.store.embedding(ids[2]).await.is_none());

    let rest = embed_new_jobs(Some(10), &deps).await.unwrap();
    assert_eq!(rest.embedded, 2);
    assert_eq!(embed_new_jobs(None, &deps).await.unwrap(), EmbedSummary::default());
}

#[tokio::test]
async fn rerunning_converges_on_the_same_vectors() {
    let test_deps = TestDependencies::new();
    let deps = test_deps.server_deps();
    let ids = seed_postings(&test_deps.store, 3).await;

    embed_jobs_by_ids(&ids, None, &deps).await;
    let mut first = Vec::new();
    for id in &ids {
        first.push(test_deps.store.embedding(*id).await.unwrap());
    }

    let again = embed_jobs_by_ids(&ids, None, &deps).await;
    assert_eq!(again.embedded, 3);
    for (id, vector) in ids.iter().zip(first) {
        assert_eq!(test_deps.store.embedding(*id).await.unwrap(), vector);
    }
    assert_eq!(test_deps.store.embedding_count().await, 3);
}

#[tokio::test]
async fn failing_middle_chunk_does_not_affect_the_others() {
    let test_deps = TestDependencies::new()
        .mock_embeddings(MockEmbeddingService::new().with_failing_batches_containing("posting 2"));
    let deps = test_deps.server_deps();
    let ids = seed_postings(&test_deps.store, 6).await;

    let summary = embed_jobs_by_ids(&ids, Some(2), &deps).await;

    assert_eq!(summary.embedded, 4);
    assert_eq!(summary.failures, vec![ids[2], ids[3]]);
    // chunk 1 once, chunk 2 three attempts, chunk 3 once
    assert_eq!(test_deps.embedding_service.batch_calls().len(), 5);
    for id in [ids[0], ids[1], ids[4], ids[5]] {
        assert!(test_deps.store.embedding(id).await.is_some());
    }
}

#[tokio::test]
async fn transient_batch_failures_are_retried() {
    let test_deps = TestDependencies::new()
        .mock_embeddings(MockEmbeddingService::new().with_batch_failures(2));
    let deps = test_deps.server_deps();
    let ids = seed_postings(&test_deps.store, 3).await;

    let summary = embed_jobs_by_ids(&ids, None, &deps).await;

    assert_eq!(summary.embedded, 3);
    assert!(summary.failures.is_empty());
    assert_eq!(test_deps.embedding_service.batch_calls().len(), 3);
}

#[tokio::test]
async fn shape_mismatch_is_retried_not_truncated() {
    let test_deps = TestDependencies::new()
        .mock_embeddings(MockEmbeddingService::new().with_short_batches(1));
    let deps = test_deps.server_deps();
    let ids = seed_postings(&test_deps.store, 3).await;

    let summary = embed_jobs_by_ids(&ids, None, &deps).await;

    assert_eq!(summary.embedded, 3);
    assert_eq!(test_deps.embedding_service.batch_calls().len(), 2);
}

#[tokio::test]
async fn persistent_shape_mismatch_fails_the_chunk() {
    let test_deps = TestDependencies::new()
        .mock_embeddings(MockEmbeddingService::new().with_short_batches(10));
    let deps = test_deps.server_deps();
    let ids = seed_postings(&test_deps.store, 2).await;

    let summary = embed_jobs_by_ids(&ids, None, &deps).await;

    assert_eq!(summary.embedded, 0);
    assert_eq!(summary.failures, ids);
    assert_eq!(test_deps.store.embedding_count().await, 0);
}

#[tokio::test]
async fn unknown_ids_are_failures_and_the_rest_proceed() {
    let test_deps = TestDependencies::new();
    let deps = test_deps.server_deps();
    let ids = seed_postings(&test_deps.store, 2).await;
    let ghost = PostingId::new();

    let summary = embed_jobs_by_ids(&[ids[0], ghost, ids[1]], None, &deps).await;

    assert_eq!(summary.embedded, 2);
    assert_eq!(summary.failures, vec![ghost]);
}

#[tokio::test]
async fn empty_vector_for_one_item_only_fails_that_item() {
    let test_deps = TestDependencies::new()
        .mock_embeddings(MockEmbeddingService::new().with_empty_embedding_for("posting 1"));
    let deps = test_deps.server_deps();
    let ids = seed_postings(&test_deps.store, 3).await;

    let summary = embed_jobs_by_ids(&ids, None, &deps).await;

    assert_eq!(summary.embedded, 2);
    assert_eq!(summary.failures, vec![ids[1]]);
    assert!(test_deps.store.embedding(ids[1]).await.is_none());
}

#[tokio::test]
async fn failed_upsert_only_fails_that_item() {
    let test_deps = TestDependencies::new();
    let deps = test_deps.server_deps();
    let ids = seed_postings(&test_deps.store, 3).await;
    test_deps.store.fail_embedding_upserts_for(ids[0]).await;

    let summary = embed_jobs_by_ids(&ids, None, &deps).await;

    assert_eq!(summary.embedded, 2);
    assert_eq!(summary.failures, vec![ids[0]]);
}

#[tokio::test]
async fn chunks_never_exceed_the_upstream_batch_limit() {
    let test_deps = TestDependencies::new();
    let deps = test_deps.server_deps();
    let ids = seed_postings(&test_deps.store, 150).await;

    let summary = embed_jobs_by_ids(&ids, Some(500), &deps).await;

    assert_eq!(summary.embedded, 150);
    let sizes: Vec<usize> = test_deps
        .embedding_service
        .batch_calls()
        .iter()
        .map(Vec::len)
        .collect();
    assert_eq!(sizes, vec![100, 50]);
}

#[tokio::test]
async fn chunks_preserve_input_order() {
    let test_deps = TestDependencies::new();
    let deps = test_deps.server_deps();
    let ids = seed_postings(&test_deps.store, 3).await;

    embed_jobs_by_ids(&[ids[2], ids[0], ids[1]], None, &deps).await;

    let batch = test_deps.embedding_service.batch_calls().remove(0);
    assert!(batch[0].starts_with("Posting 2"));
    assert!(batch[1].starts_with("Posting 0"));
    assert!(batch[2].starts_with("Posting 1"));
}

#[tokio::test]
async fn duplicate_ids_are_embedded_once() {
    let test_deps = TestDependencies::new();
    let deps = test_deps.server_deps();
    let ids = seed_postings(&test_deps.store, 1).await;

    let summary = embed_jobs_by_ids(&[ids[0], ids[0]], None, &deps).await;

    assert_eq!(summary.embedded, 1);
    assert_eq!(test_deps.embedding_service.batch_calls()[0].len(), 1);
}

#[tokio::test]
async fn embed_user_persists_the_vector() {
    let test_deps = TestDependencies::new();
    let deps = test_deps.server_deps();
    test_deps
        .store
        .insert_user(
            UserProfile::new("user-1")
                .with_name("Ada")
                .with_skills(["rust", "postgres"]),
        )
        .await;

    let vector = embed_user("user-1", &deps).await.unwrap();

    assert_eq!(test_deps.embedding_service.single_calls(), vec!["Ada\nrust postgres"]);
    assert_eq!(
        test_deps.store.find_user_vector("user-1").await.unwrap(),
        Some(vector)
    );
}

#[tokio::test]
async fn embed_user_unknown_user() {
    let test_deps = TestDependencies::new();
    let deps = test_deps.server_deps();

    let err = embed_user("ghost", &deps).await.unwrap_err();

    assert!(matches!(err, UserEmbeddingError::UserNotFound(ref id) if id == "ghost"));
    assert_eq!(test_deps.embedding_service.call_count(), 0);
}

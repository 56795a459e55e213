//! Job Store contract: everything the pipeline reads from or writes to storage.
//!
//! All writes are upserts on a natural key (URL for postings, posting ID for
//! embeddings, user ID for user vectors), so concurrent scrape and embed
//! workers converge instead of conflicting.

use anyhow::Result;
use async_trait::async_trait;

use super::models::{EmbeddedPosting, NewPosting, Posting, UserProfile};
use crate::common::PostingId;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or update by `source_url`; returns the stable posting ID.
    async fn upsert_posting(&self, posting: &NewPosting) -> Result<PostingId>;

    /// Postings for the given IDs, in no particular order. Unknown IDs are skipped.
    async fn find_postings_by_ids(&self, ids: &[PostingId]) -> Result<Vec<Posting>>;

    /// Postings without an embedding, oldest `created_at` first.
    async fn find_postings_missing_embedding(&self, limit: usize) -> Result<Vec<PostingId>>;

    /// The subset of `ids` without an embedding, in input order.
    async fn filter_missing_embedding(&self, ids: &[PostingId]) -> Result<Vec<PostingId>>;

    /// Insert or replace the embedding of a posting. Empty vectors are rejected.
    async fn upsert_embedding(&self, posting_id: PostingId, vector: &[f32]) -> Result<()>;

    /// Embedded postings, most recently scraped first, at most `cap`.
    async fn find_embedded_postings(&self, cap: usize) -> Result<Vec<EmbeddedPosting>>;

    async fn find_user(&self, user_id: &str) -> Result<Option<UserProfile>>;

    async fn find_user_vector(&self, user_id: &str) -> Result<Option<Vec<f32>>>;

    async fn update_user_vector(&self, user_id: &str, vector: &[f32]) -> Result<()>;

    /// Newest `scraped_at` first.
    async fn list_recent_postings(&self, limit: usize) -> Result<Vec<Posting>>;
}

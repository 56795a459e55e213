//! Recommendation Engine.
//!
//! Scores a capped set of embedded postings against the user's vector with
//! cosine similarity, in process, and pages through the sorted result.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::common::cosine_similarity;
use crate::domains::embeddings::{embed_user_profile, UserEmbeddingError};
use crate::domains::postings::Posting;
use crate::kernel::ServerDeps;

#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("store error: {0:#}")]
    Store(#[source] anyhow::Error),
}

impl From<UserEmbeddingError> for RecommendError {
    fn from(err: UserEmbeddingError) -> Self {
        match err {
            UserEmbeddingError::UserNotFound(id) => RecommendError::UserNotFound(id),
            UserEmbeddingError::Store(e) => RecommendError::Store(e),
            other @ (UserEmbeddingError::Embedding(_) | UserEmbeddingError::EmptyVector(_)) => {
                RecommendError::EmbeddingUnavailable(other.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPosting {
    pub posting: Posting,
    pub score: f32,
}

/// Page `page` (zero-based) of the user's recommendations, best first.
///
/// A user without a stored vector gets one computed and persisted first.
#[instrument(skip(deps))]
pub async fn recommend(
    user_id: &str,
    page: usize,
    per_page: usize,
    deps: &ServerDeps,
) -> Result<Vec<ScoredPosting>, RecommendError> {
    let user = deps
        .store
        .find_user(user_id)
        .await
        .map_err(RecommendError::Store)?
        .ok_or_else(|| RecommendError::UserNotFound(user_id.to_string()))?;

    let user_vector = match user.vector.as_deref() {
        Some(vector) if !vector.is_empty() => vector.to_vec(),
        _ => {
            debug!("No stored user vector, embedding on demand");
            embed_user_profile(&user, deps).await?
        }
    };

    let candidates = deps
        .store
        .find_embedded_postings(deps.settings.recommend_candidate_cap)
        .await
        .map_err(RecommendError::Store)?;
    let scanned = candidates.len();

    let ranked = rank(&user_vector, candidates.into_iter().map(|c| (c.posting, c.vector)));
    let page = paginate(ranked, page, per_page);

    info!(scanned, returned = page.len(), "Recommendations computed");
    Ok(page)
}

/// Score and sort descending. Equal scores keep candidate order.
pub fn rank(
    query: &[f32],
    candidates: impl IntoIterator<Item = (Posting, Vec<f32>)>,
) -> Vec<ScoredPosting> {
    let mut scored: Vec<ScoredPosting> = candidates
        .into_iter()
        .map(|(posting, vector)| ScoredPosting {
            score: cosine_similarity(query, &vector),
            posting,
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
}

/// `items[page * per_page .. page * per_page + per_page]`, clamped.
pub fn paginate<T>(items: Vec<T>, page: usize, per_page: usize) -> Vec<T> {
    let Some(start) = page.checked_mul(per_page) else {
        return Vec::new();
    };
    items.into_iter().skip(start).take(per_page).collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::common::PostingId;

    fn posting(title: &str) -> Posting {
        let now = Utc::now();
        Posting {
            id: PostingId::new(),
            title: title.into(),
            company: None,
            location: None,
            description: None,
            tags: vec![],
            salary: None,
            source_url: format!("https://example.com/{title}"),
            source_site: "REMOTEOK".into(),
            scraped_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_rank_orders_by_descending_score() {
        let ranked = rank(
            &[1.0, 0.0],
            vec![
                (posting("orthogonal"), vec![0.0, 1.0]),
                (posting("same"), vec![2.0, 0.0]),
                (posting("diagonal"), vec![1.0, 1.0]),
            ],
        );

        let titles: Vec<&str> = ranked.iter().map(|s| s.posting.title.as_str()).collect();
        assert_eq!(titles, vec!["same", "diagonal", "orthogonal"]);
        assert!((ranked[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rank_zero_vector_scores_zero() {
        let ranked = rank(&[0.0, 0.0], vec![(posting("a"), vec![1.0, 2.0])]);
        assert_eq!(ranked[0].score, 0.0);
    }

    #[test]
    fn test_rank_ties_keep_candidate_order() {
        let ranked = rank(
            &[1.0, 0.0],
            vec![(posting("first"), vec![1.0, 0.0]), (posting("second"), vec![3.0, 0.0])],
        );
        assert_eq!(ranked[0].posting.title, "first");
    }

    #[test]
    fn test_paginate() {
        let items: Vec<u32> = (0..25).collect();

        assert_eq!(paginate(items.clone(), 0, 10), (0..10).collect::<Vec<_>>());
        assert_eq!(paginate(items.clone(), 2, 10), (20..25).collect::<Vec<_>>());
        assert!(paginate(items.clone(), 3, 10).is_empty());
        assert!(paginate(items.clone(), 0, 0).is_empty());
        assert!(paginate(items, usize::MAX, 2).is_empty());
    }
}

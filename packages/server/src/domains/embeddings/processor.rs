//! Embedding Batch Processor.
//!
//! IDs are split into chunks of at most the upstream batch limit and handled
//! one chunk at a time. Every failure below the chunk level is absorbed into
//! [`EmbedSummary::failures`]; a chunk that keeps failing after its retries is
//! written off as a whole and the next chunk still runs.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use super::text::{posting_text, user_text};
use crate::common::PostingId;
use crate::config::EmbeddingSettings;
use crate::domains::postings::UserProfile;
use crate::kernel::{EmbeddingError, ServerDeps};

/// Result of an embed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmbedSummary {
    pub embedded: usize,
    /// IDs not embedded this run, in the order they were given up on
    pub failures: Vec<PostingId>,
}

impl EmbedSummary {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    fn absorb(&mut self, other: EmbedSummary) {
        self.embedded += other.embedded;
        self.failures.extend(other.failures);
    }
}

/// Chunk size actually used: `None` or `0` mean the upstream limit, and
/// nothing larger than the limit is ever sent.
pub fn effective_chunk_size(requested: Option<usize>, settings: &EmbeddingSettings) -> usize {
    let limit = settings.max_batch_request_size.max(1);
    match requested {
        Some(size) if size > 0 => size.min(limit),
        _ => limit,
    }
}

/// Embed the given postings and upsert their vectors.
///
/// Duplicate IDs are embedded once. An empty input returns immediately
/// without touching the store or the embedding service.
#[instrument(skip(ids, deps), fields(ids = ids.len()))]
pub async fn embed_jobs_by_ids(
    ids: &[PostingId],
    chunk_size: Option<usize>,
    deps: &ServerDeps,
) -> EmbedSummary {
    if ids.is_empty() {
        return EmbedSummary::default();
    }

    let settings = &deps.settings.embedding;
    let mut seen = HashSet::new();
    let ids: Vec<PostingId> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();

    let chunk_size = effective_chunk_size(chunk_size, settings);
    let chunks: Vec<&[PostingId]> = ids.chunks(chunk_size).collect();
    info!(
        ids = ids.len(),
        chunk_size,
        chunks = chunks.len(),
        max_retries = settings.max_retries,
        "Starting embed run"
    );

    let mut summary = EmbedSummary::default();
    for (index, chunk) in chunks.iter().enumerate() {
        let chunk_summary = embed_chunk(index + 1, chunks.len(), chunk, deps).await;
        summary.absorb(chunk_summary);
    }

    info!(
        embedded = summary.embedded,
        failures = summary.failures.len(),
        "Embed run finished"
    );
    summary
}

async fn embed_chunk(
    chunk: usize,
    total: usize,
    ids: &[PostingId],
    deps: &ServerDeps,
) -> EmbedSummary {
    debug!(chunk, total, size = ids.len(), "Processing chunk");
    let mut summary = EmbedSummary::default();

    let found = match deps.store.find_postings_by_ids(ids).await {
        Ok(postings) => postings,
        Err(e) => {
            error!(chunk, error = %e, "Failed to load postings for chunk");
            summary.failures.extend_from_slice(ids);
            return summary;
        }
    };

    let mut by_id: HashMap<PostingId, _> = found.into_iter().map(|p| (p.id, p)).collect();
    let mut postings = Vec::with_capacity(ids.len());
    for id in ids {
        match by_id.remove(id) {
            Some(posting) => postings.push(posting),
            None => {
                warn!(chunk, posting_id = %id, "Posting not found");
                summary.failures.push(*id);
            }
        }
    }
    if postings.is_empty() {
        return summary;
    }

    let texts: Vec<String> = postings.iter().map(posting_text).collect();
    let Some(vectors) = embed_with_retries(chunk, &texts, &deps.settings.embedding, deps).await
    else {
        error!(chunk, size = postings.len(), "Chunk failed, marking all as failures");
        summary.failures.extend(postings.iter().map(|p| p.id));
        return summary;
    };

    for (posting, vector) in postings.iter().zip(vectors) {
        if vector.is_empty() {
            warn!(posting_id = %posting.id, "Empty embedding, skipping upsert");
            summary.failures.push(posting.id);
            continue;
        }

        match deps.store.upsert_embedding(posting.id, &vector).await {
            Ok(()) => summary.embedded += 1,
            Err(e) => {
                error!(posting_id = %posting.id, error = %e, "Failed to upsert embedding");
                summary.failures.push(posting.id);
            }
        }
    }

    summary
}

/// One `embed_batch` call per attempt, linear backoff in between. A response
/// with the wrong number of vectors counts as a failed attempt.
async fn embed_with_retries(
    chunk: usize,
    texts: &[String],
    settings: &EmbeddingSettings,
    deps: &ServerDeps,
) -> Option<Vec<Vec<f32>>> {
    let attempts = settings.max_retries.max(1);

    for attempt in 1..=attempts {
        match deps.embedding_service.embed_batch(texts).await {
            Ok(vectors) if vectors.len() == texts.len() => return Some(vectors),
            Ok(vectors) => warn!(
                chunk,
                attempt,
                expected = texts.len(),
                actual = vectors.len(),
                "Embed batch returned unexpected shape"
            ),
            Err(e) => warn!(chunk, attempt, error = %e, "Embed batch attempt failed"),
        }

        if attempt < attempts {
            let wait = settings.retry_delay * attempt;
            debug!(chunk, wait_ms = wait.as_millis() as u64, "Waiting before retrying chunk");
            tokio::time::sleep(wait).await;
        }
    }

    error!(chunk, attempts, "Embed batch failed after all attempts");
    None
}

/// Embed up to `limit` postings that have no embedding yet, oldest first.
/// `None` uses the configured batch size.
#[instrument(skip(deps))]
pub async fn embed_new_jobs(limit: Option<usize>, deps: &ServerDeps) -> Result<EmbedSummary> {
    let limit = limit.unwrap_or(deps.settings.embedding.batch_size);
    let ids = deps.store.find_postings_missing_embedding(limit).await?;

    if ids.is_empty() {
        info!("No new postings to embed");
        return Ok(EmbedSummary::default());
    }

    info!(found = ids.len(), "Embedding new postings");
    Ok(embed_jobs_by_ids(&ids, None, deps).await)
}

// =============================================================================
// User vectors
// =============================================================================

#[derive(Debug, Error)]
pub enum UserEmbeddingError {
    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("embedding service returned an empty vector for user {0}")]
    EmptyVector(String),

    #[error("failed to store user vector: {0:#}")]
    Store(#[source] anyhow::Error),
}

/// Compute and persist the vector of an existing user.
pub async fn embed_user(user_id: &str, deps: &ServerDeps) -> Result<Vec<f32>, UserEmbeddingError> {
    let user = deps
        .store
        .find_user(user_id)
        .await
        .map_err(UserEmbeddingError::Store)?
        .ok_or_else(|| UserEmbeddingError::UserNotFound(user_id.to_string()))?;

    embed_user_profile(&user, deps).await
}

/// Compute and persist the vector of an already loaded user.
#[instrument(skip(user, deps), fields(user_id = %user.id))]
pub async fn embed_user_profile(
    user: &UserProfile,
    deps: &ServerDeps,
) -> Result<Vec<f32>, UserEmbeddingError> {
    let vector = deps.embedding_service.embed_one(&user_text(user)).await?;
    if vector.is_empty() {
        return Err(UserEmbeddingError::EmptyVector(user.id.clone()));
    }

    deps.store
        .update_user_vector(&user.id, &vector)
        .await
        .map_err(UserEmbeddingError::Store)?;

    info!(dimensions = vector.len(), "Embedded user");
    Ok(vector)
}

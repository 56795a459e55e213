//! In-memory Job Store for testing and local runs.
//!
//! Not suitable for production as data is lost on restart. Supports fault
//! injection so tests can exercise the per-record failure paths.

use std::collections::{HashMap, HashSet};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::models::{EmbeddedPosting, NewPosting, Posting, UserProfile};
use super::store::JobStore;
use crate::common::PostingId;

#[derive(Default)]
struct State {
    postings: HashMap<PostingId, Posting>,
    /// Insertion order, used as the `created_at` tiebreaker
    order: Vec<PostingId>,
    by_url: HashMap<String, PostingId>,
    embeddings: HashMap<PostingId, Vec<f32>>,
    users: HashMap<String, UserProfile>,
    failing_urls: HashSet<String>,
    failing_embeddings: HashSet<PostingId>,
}

impl State {
    fn seq(&self, id: &PostingId) -> usize {
        self.order.iter().position(|o| o == id).unwrap_or(usize::MAX)
    }

    /// Most recently scraped first; later inserts win ties.
    fn recent_first(&self) -> Vec<&Posting> {
        let mut postings: Vec<&Posting> = self.postings.values().collect();
        postings.sort_by(|a, b| {
            b.scraped_at
                .cmp(&a.scraped_at)
                .then_with(|| self.seq(&b.id).cmp(&self.seq(&a.id)))
        });
        postings
    }
}

#[derive(Default)]
pub struct MemoryJobStore {
    state: RwLock<State>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an external user profile.
    pub async fn insert_user(&self, user: UserProfile) {
        self.state.write().await.users.insert(user.id.clone(), user);
    }

    /// Make `upsert_posting` fail for this URL.
    pub async fn fail_posting_upserts_for(&self, url: impl Into<String>) {
        self.state.write().await.failing_urls.insert(url.into());
    }

    /// Make `upsert_embedding` fail for this posting.
    pub async fn fail_embedding_upserts_for(&self, id: PostingId) {
        self.state.write().await.failing_embeddings.insert(id);
    }

    pub async fn posting_count(&self) -> usize {
        self.state.read().await.postings.len()
    }

    pub async fn embedding_count(&self) -> usize {
        self.state.read().await.embeddings.len()
    }

    pub async fn embedding(&self, id: PostingId) -> Option<Vec<f32>> {
        self.state.read().await.embeddings.get(&id).cloned()
    }

    /// All postings in insertion order.
    pub async fn postings(&self) -> Vec<Posting> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter_map(|id| state.postings.get(id).cloned())
            .collect()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn upsert_posting(&self, new: &NewPosting) -> Result<PostingId> {
        let mut state = self.state.write().await;
        if state.failing_urls.contains(&new.source_url) {
            bail!("injected failure upserting {}", new.source_url);
        }

        let now = Utc::now();
        if let Some(id) = state.by_url.get(&new.source_url).copied() {
            if let Some(existing) = state.postings.get_mut(&id) {
                existing.title = new.title.clone();
                existing.company = new.company.clone();
                existing.location = new.location.clone();
                existing.description = new.description.clone();
                existing.tags = new.tags.clone();
                existing.salary = new.salary.clone();
                existing.source_site = new.source_site.clone();
                existing.scraped_at = now;
                existing.updated_at = now;
            }
            return Ok(id);
        }

        let id = PostingId::new();
        state.postings.insert(
            id,
            Posting {
                id,
                title: new.title.clone(),
                company: new.company.clone(),
                location: new.location.clone(),
                description: new.description.clone(),
                tags: new.tags.clone(),
                salary: new.salary.clone(),
                source_url: new.source_url.clone(),
                source_site: new.source_site.clone(),
                scraped_at: now,
                created_at: now,
                updated_at: now,
            },
        );
        state.order.push(id);
        state.by_url.insert(new.source_url.clone(), id);

        Ok(id)
    }

    async fn find_postings_by_ids(&self, ids: &[PostingId]) -> Result<Vec<Posting>> {
        let state = self.state.read().await;
        let unique: HashSet<&PostingId> = ids.iter().collect();
        Ok(unique
            .into_iter()
            .filter_map(|id| state.postings.get(id).cloned())
            .collect())
    }

    async fn find_postings_missing_embedding(&self, limit: usize) -> Result<Vec<PostingId>> {
        let state = self.state.read().await;
        Ok(state
            .order
            .iter()
            .filter(|id| !state.embeddings.contains_key(*id))
            .take(limit)
            .copied()
            .collect())
    }

    async fn filter_missing_embedding(&self, ids: &[PostingId]) -> Result<Vec<PostingId>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter(|id| state.postings.contains_key(*id) && !state.embeddings.contains_key(*id))
            .copied()
            .collect())
    }

    async fn upsert_embedding(&self, posting_id: PostingId, vector: &[f32]) -> Result<()> {
        let mut state = self.state.write().await;
        if vector.is_empty() {
            bail!("refusing to store empty embedding for posting {}", posting_id);
        }
        if state.failing_embeddings.contains(&posting_id) {
            bail!("injected failure storing embedding for {}", posting_id);
        }
        if !state.postings.contains_key(&posting_id) {
            bail!("posting {} not found", posting_id);
        }

        state.embeddings.insert(posting_id, vector.to_vec());
        Ok(())
    }

    async fn find_embedded_postings(&self, cap: usize) -> Result<Vec<EmbeddedPosting>> {
        let state = self.state.read().await;
        Ok(state
            .recent_first()
            .into_iter()
            .filter_map(|posting| {
                state.embeddings.get(&posting.id).map(|vector| EmbeddedPosting {
                    posting: posting.clone(),
                    vector: vector.clone(),
                })
            })
            .take(cap)
            .collect())
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.state.read().await.users.get(user_id).cloned())
    }

    async fn find_user_vector(&self, user_id: &str) -> Result<Option<Vec<f32>>> {
        Ok(self
            .state
            .read()
            .await
            .users
            .get(user_id)
            .and_then(|user| user.vector.clone()))
    }

    async fn update_user_vector(&self, user_id: &str, vector: &[f32]) -> Result<()> {
        let mut state = self.state.write().await;
        match state.users.get_mut(user_id) {
            Some(user) => {
                user.vector = Some(vector.to_vec());
                Ok(())
            }
            None => bail!("user {} not found", user_id),
        }
    }

    async fn list_recent_postings(&self, limit: usize) -> Result<Vec<Posting>> {
        let state = self.state.read().await;
        Ok(state
            .recent_first()
            .into_iter()
            .take(limit)
            .cloned()
            .collect())
    }
}

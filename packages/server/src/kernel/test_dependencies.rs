// TestDependencies - mock implementations for testing
//
// Provides mock services and in-memory stores that can be assembled into
// ServerDeps for tests.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::{BaseEmbeddingService, BasePageFetcher, EmbeddingError, GenerateOptions, ServerDeps};
use crate::config::PipelineSettings;
use crate::domains::postings::MemoryJobStore;
use crate::kernel::jobs::MemoryJobQueue;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Mock Embedding Service
// =============================================================================

#[derive(Default)]
struct EmbeddingScript {
    /// Text pattern -> embedding returned instead of the derived one
    patterns: Vec<(String, Vec<f32>)>,
    /// Batches containing a text with this pattern always fail
    failing_patterns: Vec<String>,
    /// Next N batch calls fail
    failures_remaining: usize,
    /// Next N batch calls return one vector too few
    short_batches_remaining: usize,
    completion: Option<String>,
}

#[derive(Default)]
struct EmbeddingCalls {
    one: Vec<String>,
    batches: Vec<Vec<String>>,
    prompts: Vec<String>,
}

/// Deterministic embedding service: the same text always maps to the same
/// non-zero vector.
pub struct MockEmbeddingService {
    dimensions: usize,
    script: Mutex<EmbeddingScript>,
    calls: Mutex<EmbeddingCalls>,
}

impl MockEmbeddingService {
    pub fn new() -> Self {
        Self {
            dimensions: 8,
            script: Mutex::new(EmbeddingScript::default()),
            calls: Mutex::new(EmbeddingCalls::default()),
        }
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// When a text contains `pattern`, return this embedding.
    pub fn with_pattern_embedding(self, pattern: &str, embedding: Vec<f32>) -> Self {
        lock(&self.script)
            .patterns
            .push((pattern.to_lowercase(), embedding));
        self
    }

    /// Return an empty vector for texts containing `pattern`.
    pub fn with_empty_embedding_for(self, pattern: &str) -> Self {
        self.with_pattern_embedding(pattern, Vec::new())
    }

    /// Fail every batch that includes a text containing `pattern`.
    pub fn with_failing_batches_containing(self, pattern: &str) -> Self {
        lock(&self.script)
            .failing_patterns
            .push(pattern.to_lowercase());
        self
    }

    /// Fail the next `count` batch calls, then recover.
    pub fn with_batch_failures(self, count: usize) -> Self {
        lock(&self.script).failures_remaining = count;
        self
    }

    /// Drop the last vector of the next `count` batch responses.
    pub fn with_short_batches(self, count: usize) -> Self {
        lock(&self.script).short_batches_remaining = count;
        self
    }

    pub fn with_completion(self, completion: impl Into<String>) -> Self {
        lock(&self.script).completion = Some(completion.into());
        self
    }

    /// The vector this mock returns for `text`, absent any override.
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();

        (0..self.dimensions as u64)
            .map(|i| {
                let bits = seed.rotate_left((i * 7 % 64) as u32) ^ i.wrapping_mul(0x9E37_79B9);
                (bits % 1000) as f32 / 1000.0 + 0.001
            })
            .collect()
    }

    fn embedding_for(&self, text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let script = lock(&self.script);
        script
            .patterns
            .iter()
            .find(|(pattern, _)| lowered.contains(pattern))
            .map(|(_, embedding)| embedding.clone())
            .unwrap_or_else(|| self.vector_for(text))
    }

    /// Texts passed to `embed_one`, in call order.
    pub fn single_calls(&self) -> Vec<String> {
        lock(&self.calls).one.clone()
    }

    /// Inputs of every `embed_batch` call, in call order.
    pub fn batch_calls(&self) -> Vec<Vec<String>> {
        lock(&self.calls).batches.clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.calls).prompts.clone()
    }

    /// Total calls of any kind; zero means the service was never touched.
    pub fn call_count(&self) -> usize {
        let calls = lock(&self.calls);
        calls.one.len() + calls.batches.len() + calls.prompts.len()
    }
}

impl Default for MockEmbeddingService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseEmbeddingService for MockEmbeddingService {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        lock(&self.calls).one.push(text.to_string());
        Ok(self.embedding_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        lock(&self.calls).batches.push(texts.to_vec());

        let truncate = {
            let mut script = lock(&self.script);
            let poisoned = texts.iter().any(|text| {
                let lowered = text.to_lowercase();
                script.failing_patterns.iter().any(|p| lowered.contains(p))
            });
            if poisoned || script.failures_remaining > 0 {
                script.failures_remaining = script.failures_remaining.saturating_sub(1);
                return Err(EmbeddingError::Unavailable {
                    attempts: 1,
                    message: "mock upstream failure".to_string(),
                });
            }
            if script.short_batches_remaining > 0 {
                script.short_batches_remaining -= 1;
                true
            } else {
                false
            }
        };

        let mut vectors: Vec<Vec<f32>> = texts.iter().map(|t| self.embedding_for(t)).collect();
        if truncate {
            vectors.pop();
        }
        Ok(vectors)
    }

    async fn generate(
        &self,
        prompt: &str,
        _options: GenerateOptions,
    ) -> Result<String, EmbeddingError> {
        lock(&self.calls).prompts.push(prompt.to_string());
        Ok(lock(&self.script)
            .completion
            .clone()
            .unwrap_or_else(|| format!("mock completion: {prompt}")))
    }
}

// =============================================================================
// Mock Page Fetcher
// =============================================================================

#[derive(Default)]
pub struct MockPageFetcher {
    pages: Mutex<HashMap<String, String>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl MockPageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        lock(&self.pages).insert(url.into(), html.into());
        self
    }

    /// Fetching `url` fails as if the host were unreachable.
    pub fn with_failure(self, url: impl Into<String>) -> Self {
        lock(&self.failing).insert(url.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl BasePageFetcher for MockPageFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String> {
        lock(&self.calls).push(url.to_string());

        if lock(&self.failing).contains(url) {
            bail!("connection refused: {}", url);
        }
        match lock(&self.pages).get(url) {
            Some(html) => Ok(html.clone()),
            None => bail!("HTTP 404 Not Found for {}", url),
        }
    }
}

// =============================================================================
// TestDependencies - Builder for test dependencies
// =============================================================================

#[derive(Clone)]
pub struct TestDependencies {
    pub store: Arc<MemoryJobStore>,
    pub queue: Arc<MemoryJobQueue>,
    pub embedding_service: Arc<MockEmbeddingService>,
    pub page_fetcher: Arc<MockPageFetcher>,
    pub settings: PipelineSettings,
}

impl TestDependencies {
    pub fn new() -> Self {
        let mut settings = PipelineSettings::default();
        settings.embedding.retry_delay = Duration::from_millis(1);

        Self {
            store: Arc::new(MemoryJobStore::new()),
            queue: Arc::new(MemoryJobQueue::new()),
            embedding_service: Arc::new(MockEmbeddingService::new()),
            page_fetcher: Arc::new(MockPageFetcher::new()),
            settings,
        }
    }

    /// Set a mock embedding service
    pub fn mock_embeddings(mut self, service: MockEmbeddingService) -> Self {
        self.embedding_service = Arc::new(service);
        self
    }

    /// Set a mock page fetcher
    pub fn mock_fetcher(mut self, fetcher: MockPageFetcher) -> Self {
        self.page_fetcher = Arc::new(fetcher);
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// ServerDeps sharing this builder's store, queue and mocks.
    pub fn server_deps(&self) -> Arc<ServerDeps> {
        Arc::new(ServerDeps::new(
            self.store.clone(),
            self.queue.clone(),
            self.embedding_service.clone(),
            self.page_fetcher.clone(),
            self.settings.clone(),
        ))
    }

    pub fn into_server_deps(self) -> Arc<ServerDeps> {
        self.server_deps()
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}

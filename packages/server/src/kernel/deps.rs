//! Server dependencies for job handlers (using traits for testability)
//!
//! This module provides the central dependency container passed to every
//! handler and pipeline entrypoint. All external services sit behind trait
//! objects so tests can swap in the mocks from `test_dependencies`.

use std::sync::Arc;

use anyhow::Result;
use sqlx::PgPool;

use crate::config::{Config, PipelineSettings};
use crate::domains::postings::{JobStore, PostgresJobStore};
use crate::kernel::jobs::{JobOptions, JobQueue, PostgresJobQueue};
use crate::kernel::{BaseEmbeddingService, BasePageFetcher, GeminiEmbeddingService, HttpPageFetcher};

/// Server dependencies accessible to job handlers
#[derive(Clone)]
pub struct ServerDeps {
    pub store: Arc<dyn JobStore>,
    /// Queue handle; handlers use it to chain follow-up jobs
    pub queue: Arc<dyn JobQueue>,
    pub embedding_service: Arc<dyn BaseEmbeddingService>,
    pub page_fetcher: Arc<dyn BasePageFetcher>,
    pub settings: PipelineSettings,
}

impl ServerDeps {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
        embedding_service: Arc<dyn BaseEmbeddingService>,
        page_fetcher: Arc<dyn BasePageFetcher>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            queue,
            embedding_service,
            page_fetcher,
            settings,
        }
    }

    /// Production wiring: Postgres store and queue, Gemini, HTTP fetcher.
    pub fn from_pools(config: &Config, store_pool: PgPool, queue_pool: PgPool) -> Result<Self> {
        Ok(Self::new(
            Arc::new(PostgresJobStore::new(store_pool)),
            Arc::new(PostgresJobQueue::new(queue_pool)),
            Arc::new(GeminiEmbeddingService::from_settings(&config.gemini)?),
            Arc::new(HttpPageFetcher::new()?),
            config.pipeline.clone(),
        ))
    }

    /// Queue defaults for jobs enqueued by the pipeline.
    pub fn job_options(&self) -> JobOptions {
        JobOptions {
            max_attempts: self.settings.queue_max_attempts,
            backoff: self.settings.queue_backoff,
        }
    }
}

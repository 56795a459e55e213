//! Job handlers for the pipeline.
//!
//! ## Pipeline Flow
//!
//! ```text
//! ScrapeSourceJob  → scrape()            → enqueue EmbedPostingsJob (IDs still lacking vectors)
//! EmbedPostingsJob → embed_jobs_by_ids() → terminal
//! ```

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use super::commands::{EmbedPostingsJob, ScrapeSourceJob};
use crate::domains::embeddings::embed_jobs_by_ids;
use crate::domains::scraping::{scrape, Source};
use crate::kernel::jobs::{enqueue_command, EnqueueResult, JobRegistry};
use crate::kernel::ServerDeps;

/// Handle ScrapeSourceJob.
///
/// Scrapes the source, then enqueues an embed job for the upserted postings
/// that have no embedding yet.
pub async fn handle_scrape_source(job: ScrapeSourceJob, deps: Arc<ServerDeps>) -> Result<()> {
    info!(source = %job.source, "Handling scrape job");

    let result = scrape(&job.source, &deps).await?;
    let pending = deps
        .store
        .filter_missing_embedding(&result.inserted_or_updated_ids)
        .await?;

    if pending.is_empty() {
        info!(source = %job.source, count = result.count, "Nothing new to embed");
        return Ok(());
    }

    let postings = pending.len();
    let enqueued = enqueue_command(
        deps.queue.as_ref(),
        &EmbedPostingsJob::new(pending),
        deps.job_options(),
    )
    .await?;

    info!(
        source = %job.source,
        count = result.count,
        postings,
        embed_job_id = %enqueued.job_id(),
        "Scrape completed, enqueued embedding"
    );
    Ok(())
}

/// Handle EmbedPostingsJob.
///
/// Partial failures are reported in the log, not retried: the IDs stay
/// un-embedded and the periodic sweep picks them up again.
pub async fn handle_embed_postings(job: EmbedPostingsJob, deps: Arc<ServerDeps>) -> Result<()> {
    info!(postings = job.posting_ids.len(), "Handling embed job");

    let summary = embed_jobs_by_ids(&job.posting_ids, job.chunk_size, &deps).await;

    if summary.is_partial() {
        warn!(
            embedded = summary.embedded,
            failures = summary.failures.len(),
            "Embed job partially failed"
        );
    }
    Ok(())
}

/// Register both pipeline job handlers with the registry.
pub fn register_pipeline_jobs(registry: &mut JobRegistry) {
    registry.register::<ScrapeSourceJob, _, _>(|job, deps| async move {
        handle_scrape_source(job, deps).await
    });

    registry.register::<EmbedPostingsJob, _, _>(|job, deps| async move {
        handle_embed_postings(job, deps).await
    });
}

pub fn build_job_registry() -> JobRegistry {
    let mut registry = JobRegistry::new();
    register_pipeline_jobs(&mut registry);
    registry
}

/// Enqueue a scrape of `source_name`.
///
/// Unknown sources are rejected before anything is enqueued. While a scrape
/// of the same source is queued or running, returns that job as a duplicate.
pub async fn trigger_scrape(source_name: &str, deps: &ServerDeps) -> Result<EnqueueResult> {
    let source = Source::parse(source_name)?;
    let result = enqueue_command(
        deps.queue.as_ref(),
        &ScrapeSourceJob::new(source),
        deps.job_options(),
    )
    .await?;

    match result {
        EnqueueResult::Created(id) => info!(source = %source, job_id = %id, "Scrape enqueued"),
        EnqueueResult::Duplicate(id) => {
            info!(source = %source, job_id = %id, "Scrape already pending")
        }
    }
    Ok(result)
}

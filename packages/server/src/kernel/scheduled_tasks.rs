//! Scheduled background tasks.
//!
//! - Cron-driven scrape triggers using tokio-cron-scheduler
//! - A periodic embed sweep that picks up postings still lacking vectors
//!
//! # Architecture
//!
//! Scheduled tasks run independently of the job workers. The scrape trigger
//! only enqueues jobs; the sweep does its work inline, raced against a
//! timeout.
//!
//! ```text
//! Scheduler (SCRAPE_SCHEDULE)
//!     │
//!     └─► For each source → trigger_scrape() → queue
//!
//! Embed sweep (every EMBED_SWEEP_INTERVAL_MS)
//!     │
//!     └─► embed_new_jobs() ── timeout ──► logged, retried next tick
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::MissedTickBehavior;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ScheduleSettings;
use crate::domains::embeddings::embed_new_jobs;
use crate::domains::jobs::trigger_scrape;
use crate::domains::scraping::Source;
use crate::kernel::ServerDeps;

/// Sources named in the settings, or every known source if none are.
pub fn scheduled_sources(settings: &ScheduleSettings) -> Result<Vec<Source>> {
    if settings.scrape_sources.is_empty() {
        return Ok(Source::ALL.to_vec());
    }

    settings
        .scrape_sources
        .iter()
        .map(|name| Source::parse(name).context("Invalid SCRAPE_SOURCES entry"))
        .collect()
}

/// Start the cron scrape trigger, if a schedule is configured.
pub async fn start_scheduler(
    deps: Arc<ServerDeps>,
    settings: &ScheduleSettings,
) -> Result<Option<JobScheduler>> {
    let Some(schedule) = settings.scrape_schedule.clone() else {
        info!("No SCRAPE_SCHEDULE set, scheduled scraping disabled");
        return Ok(None);
    };
    let sources = scheduled_sources(settings)?;

    let scheduler = JobScheduler::new().await?;

    let scrape_sources = sources.clone();
    let scrape_job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
        let deps = deps.clone();
        let sources = scrape_sources.clone();
        Box::pin(async move {
            run_periodic_scrape(&deps, &sources).await;
        })
    })
    .with_context(|| format!("Invalid SCRAPE_SCHEDULE: {schedule}"))?;

    scheduler.add(scrape_job).await?;
    scheduler.start().await?;

    info!(
        schedule = %schedule,
        sources = ?sources.iter().map(Source::as_str).collect::<Vec<_>>(),
        "Scheduled scraping started"
    );
    Ok(Some(scheduler))
}

/// Trigger a scrape for each source. Returns how many were newly enqueued.
pub async fn run_periodic_scrape(deps: &ServerDeps, sources: &[Source]) -> usize {
    info!(sources = sources.len(), "Running periodic scrape trigger");

    let mut created = 0;
    for source in sources {
        match trigger_scrape(source.as_str(), deps).await {
            Ok(result) if result.is_created() => created += 1,
            Ok(_) => {}
            Err(e) => error!(source = %source, error = %e, "Failed to trigger scrape"),
        }
    }
    created
}

/// Run the embed sweep until `shutdown` is cancelled.
///
/// Each sweep is raced against `timeout`; a timed out sweep is logged and
/// the postings it did not reach are picked up on the next tick.
pub async fn run_embed_sweep(
    deps: Arc<ServerDeps>,
    every: Duration,
    timeout: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_ms = every.as_millis() as u64, "Embed sweep started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match tokio::time::timeout(timeout, embed_new_jobs(None, &deps)).await {
            Ok(Ok(summary)) if summary.is_partial() => warn!(
                embedded = summary.embedded,
                failures = summary.failures.len(),
                "Embed sweep partially failed"
            ),
            Ok(Ok(summary)) => {
                if summary.embedded > 0 {
                    info!(embedded = summary.embedded, "Embed sweep finished");
                }
            }
            Ok(Err(e)) => error!(error = %e, "Embed sweep failed"),
            Err(_) => warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Embed sweep timed out, retrying next tick"
            ),
        }
    }
    info!("Embed sweep stopped");
}

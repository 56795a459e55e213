//! Pipeline worker
//!
//! Runs the queue workers, the periodic embed sweep and the scheduled scrape
//! triggers until Ctrl-C, then shuts down gracefully.

use std::sync::Arc;

use anyhow::{Context, Result};
use jobfeed_core::config::Config;
use jobfeed_core::domains::jobs::build_job_registry;
use jobfeed_core::kernel::jobs::{JobWorker, JobWorkerConfig};
use jobfeed_core::kernel::{run_embed_sweep, start_scheduler, ServerDeps};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn connect(url: &str, label: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .with_context(|| format!("Failed to connect to {label} database"))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .with_context(|| format!("Failed to run migrations on {label} database"))?;

    Ok(pool)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,jobfeed_core=debug,sqlx=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Starting job feed worker");

    let store_pool = connect(&config.database_url, "store").await?;
    let queue_pool = if config.queue_database_url == config.database_url {
        store_pool.clone()
    } else {
        connect(&config.queue_database_url, "queue").await?
    };

    let deps = Arc::new(ServerDeps::from_pools(&config, store_pool, queue_pool)?);
    let registry = Arc::new(build_job_registry());
    let shutdown = CancellationToken::new();

    let worker = JobWorker::new(
        deps.queue.clone(),
        registry,
        deps.clone(),
        JobWorkerConfig::from_settings(&config.worker),
    );
    let worker_handle = tokio::spawn(worker.run(shutdown.clone()));

    let sweep_handle = config.schedule.embed_sweep_interval.map(|every| {
        tokio::spawn(run_embed_sweep(
            deps.clone(),
            every,
            config.schedule.embed_sweep_timeout,
            shutdown.clone(),
        ))
    });

    let mut scheduler = start_scheduler(deps.clone(), &config.schedule).await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");
    shutdown.cancel();

    if let Some(scheduler) = scheduler.as_mut() {
        if let Err(e) = scheduler.shutdown().await {
            tracing::warn!(error = %e, "Scheduler did not shut down cleanly");
        }
    }

    // The worker enforces its own drain timeout
    match worker_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Job worker exited with error"),
        Err(e) => tracing::error!(error = %e, "Job worker task panicked"),
    }

    if let Some(handle) = sweep_handle {
        if tokio::time::timeout(config.worker.shutdown_timeout, handle)
            .await
            .is_err()
        {
            tracing::warn!("Embed sweep still running at shutdown, abandoning");
        }
    }

    tracing::info!("Worker stopped");
    Ok(())
}

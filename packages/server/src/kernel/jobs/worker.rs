//! Job worker service for processing queued jobs.
//!
//! The `JobWorker` is a long-running service that:
//! - Claims ready jobs from the [`JobQueue`] up to its concurrency limit
//! - Executes each through the [`JobRegistry`], raced against a timeout
//! - Heartbeats the lease while a job runs
//! - Classifies failures and hands them back to the queue for retry
//!
//! # Architecture
//!
//! ```text
//! JobWorker
//!     │
//!     ├─► claim(capacity) from JobQueue
//!     ├─► spawn per job ──► timeout(JobRegistry.execute) + heartbeat
//!     │                         └─► mark_completed / mark_failed
//!     └─► on shutdown: stop claiming, drain, abort and release stragglers
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::job::{ErrorKind, FailureOutcome, JobKind};
use super::queue::{ClaimedJob, JobQueue};
use super::registry::{PayloadError, SharedJobRegistry};
use crate::common::JobId;
use crate::config::WorkerSettings;
use crate::domains::scraping::ScrapeError;
use crate::kernel::ServerDeps;

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct JobWorkerConfig {
    pub worker_id: String,
    /// Maximum number of jobs in flight
    pub max_concurrency: usize,
    /// How long to wait when no jobs are available
    pub poll_interval: Duration,
    /// Per-job execution timeout
    pub job_timeout: Duration,
    /// Lease taken at claim and renewed by heartbeats
    pub lease: Duration,
    /// How long shutdown waits for in-flight jobs
    pub shutdown_timeout: Duration,
}

impl Default for JobWorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::new_v4()),
            max_concurrency: 4,
            poll_interval: Duration::from_secs(1),
            job_timeout: Duration::from_secs(300),
            lease: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl JobWorkerConfig {
    pub fn from_settings(settings: &WorkerSettings) -> Self {
        Self {
            max_concurrency: settings.max_concurrency.max(1),
            poll_interval: settings.poll_interval,
            job_timeout: settings.job_timeout,
            lease: settings.lease,
            shutdown_timeout: settings.shutdown_timeout,
            ..Default::default()
        }
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    fn heartbeat_interval(&self) -> Duration {
        (self.lease / 3).max(Duration::from_millis(10))
    }
}

struct WorkerShared {
    queue: Arc<dyn JobQueue>,
    registry: SharedJobRegistry,
    deps: Arc<ServerDeps>,
    config: JobWorkerConfig,
    /// Track running jobs for shutdown reporting
    running_jobs: RwLock<HashMap<JobId, JobKind>>,
}

/// A job worker that processes jobs from a queue.
pub struct JobWorker {
    shared: Arc<WorkerShared>,
}

impl JobWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        registry: SharedJobRegistry,
        deps: Arc<ServerDeps>,
        config: JobWorkerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(WorkerShared {
                queue,
                registry,
                deps,
                config,
                running_jobs: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.shared.config.worker_id
    }

    /// Run until `shutdown` is cancelled, then drain.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let config = &self.shared.config;
        info!(
            worker_id = %config.worker_id,
            max_concurrency = config.max_concurrency,
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            "job worker starting"
        );

        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            while let Some(joined) = in_flight.try_join_next() {
                log_join_error(joined);
            }

            if shutdown.is_cancelled() {
                break;
            }

            let capacity = config.max_concurrency.saturating_sub(in_flight.len());
            if capacity == 0 {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    Some(joined) = in_flight.join_next() => log_join_error(joined),
                }
                continue;
            }

            let jobs = match self
                .shared
                .queue
                .claim(&config.worker_id, capacity, config.lease)
                .await
            {
                Ok(jobs) => jobs,
                Err(e) => {
                    error!(error = %e, "failed to claim jobs");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(config.poll_interval) => {}
                    }
                    continue;
                }
            };

            if jobs.is_empty() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(config.poll_interval) => {}
                    Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                        log_join_error(joined)
                    }
                }
                continue;
            }

            debug!(count = jobs.len(), "claimed jobs");

            for job in jobs {
                let shared = self.shared.clone();
                in_flight.spawn(async move { shared.process_job(job).await });
            }
        }

        self.drain(in_flight).await;
        info!(worker_id = %config.worker_id, "job worker stopped");
        Ok(())
    }

    /// Wait for in-flight jobs up to the grace period, then abort the rest.
    async fn drain(&self, mut in_flight: JoinSet<()>) {
        let config = &self.shared.config;
        if in_flight.is_empty() {
            return;
        }

        info!(
            count = in_flight.len(),
            grace_ms = config.shutdown_timeout.as_millis() as u64,
            "waiting for running jobs to complete"
        );

        let drained = tokio::time::timeout(config.shutdown_timeout, async {
            while let Some(joined) = in_flight.join_next().await {
                log_join_error(joined);
            }
        })
        .await;

        if drained.is_ok() {
            return;
        }

        warn!(count = in_flight.len(), "shutdown grace period elapsed, aborting running jobs");
        in_flight.abort_all();
        while in_flight.join_next().await.is_some() {}

        // Aborted tasks never reach their own cleanup, so their entries remain.
        let abandoned: Vec<(JobId, JobKind)> = self
            .shared
            .running_jobs
            .write()
            .await
            .drain()
            .collect();

        // Hand them back now instead of waiting for the lease to lapse.
        for (job_id, kind) in abandoned {
            warn!(job_id = %job_id, kind = %kind, "job still active at shutdown, aborted");
            match self
                .shared
                .queue
                .mark_failed(
                    job_id,
                    &config.worker_id,
                    "abandoned at shutdown",
                    ErrorKind::Shutdown,
                )
                .await
            {
                Ok(FailureOutcome::Stale) => {
                    debug!(job_id = %job_id, "abandoned job was already settled");
                }
                Ok(_) => {}
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "failed to release abandoned job");
                }
            }
        }
    }
}

impl WorkerShared {
    /// Process a single claimed job.
    async fn process_job(&self, job: ClaimedJob) {
        let job_id = job.id;
        let kind = job.kind();

        self.running_jobs.write().await.insert(job_id, kind);
        info!(job_id = %job_id, kind = %kind, attempt = job.job.attempts, "job claimed");

        let heartbeat_cancel = CancellationToken::new();
        let heartbeat = self.spawn_heartbeat(job_id, heartbeat_cancel.clone());
        // Stops the heartbeat even if this task is aborted mid-job.
        let _heartbeat_guard = heartbeat_cancel.clone().drop_guard();

        let result = tokio::time::timeout(
            self.config.job_timeout,
            self.registry.execute(&job, self.deps.clone()),
        )
        .await;

        heartbeat_cancel.cancel();
        let _ = heartbeat.await;

        match result {
            Ok(Ok(())) => {
                info!(job_id = %job_id, kind = %kind, "job completed");
                match self.queue.mark_completed(job_id, &self.config.worker_id).await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(job_id = %job_id, kind = %kind, "job no longer held by this worker");
                    }
                    Err(e) => {
                        error!(job_id = %job_id, error = %e, "failed to mark job as completed");
                    }
                }
            }
            Ok(Err(e)) => {
                let error_kind = classify_error(&e);
                warn!(job_id = %job_id, kind = %kind, error = %format!("{:#}", e), ?error_kind, "job failed");
                self.fail(job_id, &format!("{:#}", e), error_kind).await;
            }
            Err(_) => {
                let message = format!("timed out after {}ms", self.config.job_timeout.as_millis());
                warn!(job_id = %job_id, kind = %kind, "job {}", message);
                self.fail(job_id, &message, ErrorKind::Retryable).await;
            }
        }

        self.running_jobs.write().await.remove(&job_id);
    }

    async fn fail(&self, job_id: JobId, message: &str, kind: ErrorKind) {
        match self
            .queue
            .mark_failed(job_id, &self.config.worker_id, message, kind)
            .await
        {
            Ok(FailureOutcome::Stale) => {
                warn!(job_id = %job_id, "job no longer held by this worker");
            }
            Ok(_) => {}
            Err(e) => {
                error!(job_id = %job_id, error = %e, "failed to mark job as failed");
            }
        }
    }

    fn spawn_heartbeat(
        &self,
        job_id: JobId,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let queue = self.queue.clone();
        let worker_id = self.config.worker_id.clone();
        let lease = self.config.lease;
        let every = self.config.heartbeat_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = queue.heartbeat(job_id, &worker_id, lease).await {
                            warn!(job_id = %job_id, error = %e, "heartbeat failed");
                        }
                    }
                }
            }
        })
    }
}

fn log_join_error(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!(error = %e, "job task panicked");
        }
    }
}

/// Classify an error to determine retry behavior.
///
/// Caller errors (bad payloads, unknown sources) are permanent; everything
/// else, including network and store failures, is retried.
pub fn classify_error(error: &anyhow::Error) -> ErrorKind {
    for cause in error.chain() {
        if cause.downcast_ref::<PayloadError>().is_some() {
            return ErrorKind::NonRetryable;
        }
        if let Some(scrape) = cause.downcast_ref::<ScrapeError>() {
            if !scrape.is_retryable() {
                return ErrorKind::NonRetryable;
            }
        }
    }

    ErrorKind::Retryable
}

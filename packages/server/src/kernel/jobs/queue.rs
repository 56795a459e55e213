//! Job queue contract.
//!
//! Delivery is at-least-once: a job whose lease expires before it is
//! acknowledged is handed out again, so every handler must be idempotent.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use super::job::{BackoffPolicy, ErrorKind, FailureOutcome, Job, JobKind, JobStatus, NewJob};
use crate::common::JobId;

/// Result type for enqueue operations that handles idempotency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    /// Job was enqueued, returns new job ID
    Created(JobId),
    /// A queued/active job with the same idempotency key exists, returns its ID
    Duplicate(JobId),
}

impl EnqueueResult {
    /// Get the job ID regardless of whether it was created or duplicate
    pub fn job_id(&self) -> JobId {
        match self {
            EnqueueResult::Created(id) | EnqueueResult::Duplicate(id) => *id,
        }
    }

    /// Returns true if this was a newly created job
    pub fn is_created(&self) -> bool {
        matches!(self, EnqueueResult::Created(_))
    }
}

/// A claimed job ready for execution.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: JobId,
    pub job: Job,
}

impl ClaimedJob {
    pub fn new(job: Job) -> Self {
        Self { id: job.id, job }
    }

    pub fn kind(&self) -> JobKind {
        self.job.kind
    }

    /// Deserialize the payload into a typed job.
    pub fn deserialize<C: DeserializeOwned>(&self) -> Result<C> {
        serde_json::from_value(self.job.payload.clone())
            .map_err(|e| anyhow!("failed to deserialize {} job {}: {}", self.job.kind, self.id, e))
    }
}

/// Metadata for typed job payloads.
///
/// Each job struct names its kind and, optionally, an idempotency key.
pub trait CommandMeta: Serialize {
    const KIND: JobKind;

    /// If provided, ensures only one queued/active job exists with this key.
    fn idempotency_key(&self) -> Option<String> {
        None
    }
}

/// Queue defaults applied to typed jobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobOptions {
    pub max_attempts: i32,
    pub backoff: BackoffPolicy,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl NewJob {
    /// Build an enqueue request from a typed job.
    pub fn for_command<C: CommandMeta>(command: &C, options: JobOptions) -> Result<Self> {
        let payload = serde_json::to_value(command)?;

        Ok(Self {
            kind: C::KIND,
            payload,
            max_attempts: options.max_attempts,
            backoff: options.backoff,
            idempotency_key: command.idempotency_key(),
            run_at: None,
        })
    }
}

/// Durable job queue operations.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job for execution at `run_at` (default: now).
    ///
    /// If the job carries an idempotency key and a matching queued/active job
    /// exists, returns `EnqueueResult::Duplicate` with the existing job ID.
    async fn enqueue(&self, job: NewJob) -> Result<EnqueueResult>;

    /// Claim up to `limit` ready jobs, holding each for `lease`.
    ///
    /// Ready means queued and due, or active with an expired lease (the
    /// previous worker is presumed dead). Claiming counts an attempt.
    async fn claim(&self, worker_id: &str, limit: usize, lease: Duration) -> Result<Vec<ClaimedJob>>;

    /// Extend the lease of a job `worker_id` still holds.
    async fn heartbeat(&self, job_id: JobId, worker_id: &str, lease: Duration) -> Result<()>;

    /// Acknowledge a job `worker_id` still holds.
    ///
    /// Returns `false` and changes nothing when the job is no longer active
    /// for that worker (already settled, or redelivered to another worker).
    async fn mark_completed(&self, job_id: JobId, worker_id: &str) -> Result<bool>;

    /// Record a failed attempt and schedule a retry if attempts remain.
    ///
    /// Returns `FailureOutcome::Stale` and changes nothing when the job is no
    /// longer active for `worker_id`.
    async fn mark_failed(
        &self,
        job_id: JobId,
        worker_id: &str,
        error: &str,
        kind: ErrorKind,
    ) -> Result<FailureOutcome>;

    async fn get(&self, job_id: JobId) -> Result<Option<Job>>;

    async fn status(&self, job_id: JobId) -> Result<Option<JobStatus>> {
        Ok(self.get(job_id).await?.map(|job| job.status))
    }
}

/// Enqueue a typed job with the given queue defaults.
pub async fn enqueue_command<C: CommandMeta + Sync>(
    queue: &dyn JobQueue,
    command: &C,
    options: JobOptions,
) -> Result<EnqueueResult> {
    let job = NewJob::for_command(command, options)?;
    queue.enqueue(job).await
}

//! In-process job queue with the same delivery semantics as the Postgres queue.
//!
//! Used by tests and by `pipeline_cli` runs that do not need durability.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::job::{ErrorKind, FailureOutcome, Job, JobStatus, NewJob};
use super::queue::{ClaimedJob, EnqueueResult, JobQueue};
use crate::common::JobId;

#[derive(Default)]
pub struct MemoryJobQueue {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every job, oldest first.
    pub async fn jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|job| job.id);
        jobs
    }

    pub async fn count_with_status(&self, status: JobStatus) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|job| job.status == status)
            .count()
    }
}

fn lease_until(now: DateTime<Utc>, lease: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(lease)
        .ok()
        .and_then(|lease| now.checked_add_signed(lease))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn lease_expired(job: &Job, now: DateTime<Utc>) -> bool {
    job.status == JobStatus::Active && job.lease_expires_at.is_some_and(|at| at <= now)
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, new: NewJob) -> Result<EnqueueResult> {
        let mut jobs = self.jobs.write().await;

        if let Some(key) = &new.idempotency_key {
            let holder = jobs.values().find(|job| {
                job.idempotency_key.as_ref() == Some(key)
                    && matches!(job.status, JobStatus::Queued | JobStatus::Active)
            });
            if let Some(existing) = holder {
                return Ok(EnqueueResult::Duplicate(existing.id));
            }
        }

        let job = Job::from_new(new, Utc::now());
        let id = job.id;
        info!(job_id = %id, kind = %job.kind, "job enqueued");
        jobs.insert(id, job);

        Ok(EnqueueResult::Created(id))
    }

    async fn claim(&self, worker_id: &str, limit: usize, lease: Duration) -> Result<Vec<ClaimedJob>> {
        let now = Utc::now();
        let mut jobs = self.jobs.write().await;

        for job in jobs.values_mut() {
            if lease_expired(job, now) && !job.has_attempts_left() {
                job.status = JobStatus::Failed;
                job.lease_expires_at = None;
                job.last_error
                    .get_or_insert_with(|| "lease expired on final attempt".to_string());
                job.updated_at = now;
                error!(job_id = %job.id, "job failed permanently: lease expired on final attempt");
            }
        }

        let mut ready: Vec<&mut Job> = jobs
            .values_mut()
            .filter(|job| {
                (job.status == JobStatus::Queued && job.run_at <= now) || lease_expired(job, now)
            })
            .collect();
        ready.sort_by_key(|job| (job.run_at, job.id));

        Ok(ready
            .into_iter()
            .take(limit)
            .map(|job| {
                job.status = JobStatus::Active;
                job.attempts += 1;
                job.worker_id = Some(worker_id.to_string());
                job.lease_expires_at = Some(lease_until(now, lease));
                job.updated_at = now;
                ClaimedJob::new(job.clone())
            })
            .collect())
    }

    async fn heartbeat(&self, job_id: JobId, worker_id: &str, lease: Duration) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&job_id) {
            if job.is_held_by(worker_id) {
                let now = Utc::now();
                job.lease_expires_at = Some(lease_until(now, lease));
                job.updated_at = now;
            }
        }
        Ok(())
    }

    async fn mark_completed(&self, job_id: JobId, worker_id: &str) -> Result<bool> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| anyhow!("queue job {} not found", job_id))?;

        if !job.is_held_by(worker_id) {
            warn!(
                job_id = %job_id,
                worker_id = %worker_id,
                status = ?job.status,
                "ignoring completion from a worker that no longer holds the job"
            );
            return Ok(false);
        }

        job.status = JobStatus::Completed;
        job.lease_expires_at = None;
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_failed(
        &self,
        job_id: JobId,
        worker_id: &str,
        error: &str,
        kind: ErrorKind,
    ) -> Result<FailureOutcome> {
        let now = Utc::now();
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| anyhow!("queue job {} not found", job_id))?;

        if !job.is_held_by(worker_id) {
            warn!(
                job_id = %job_id,
                worker_id = %worker_id,
                status = ?job.status,
                error = %error,
                "ignoring failure from a worker that no longer holds the job"
            );
            return Ok(FailureOutcome::Stale);
        }

        let outcome = job.failure_outcome(kind, now);
        job.last_error = Some(error.to_string());
        job.lease_expires_at = None;
        job.updated_at = now;

        match outcome {
            FailureOutcome::Retrying { retry_at } => {
                job.status = JobStatus::Queued;
                job.run_at = retry_at;
                job.worker_id = None;
                warn!(
                    job_id = %job_id,
                    kind = %job.kind,
                    attempt = job.attempts,
                    retry_at = %retry_at,
                    error = %error,
                    "job retry scheduled"
                );
            }
            FailureOutcome::Failed => {
                job.status = JobStatus::Failed;
                error!(
                    job_id = %job_id,
                    kind = %job.kind,
                    attempts = job.attempts,
                    error = %error,
                    "job failed permanently"
                );
            }
            FailureOutcome::Stale => {}
        }

        Ok(outcome)
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>> {
        Ok(self.jobs.read().await.get(&job_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::jobs::{BackoffPolicy, JobKind};
    use serde_json::json;

    fn scrape_job(key: Option<&str>) -> NewJob {
        let job = NewJob::builder()
            .kind(JobKind::Scrape)
            .payload(json!({"source": "remoteok"}))
            .max_attempts(2)
            .backoff(BackoffPolicy::fixed(Duration::ZERO));
        match key {
            Some(key) => NewJob {
                idempotency_key: Some(key.to_string()),
                ..job.build()
            },
            None => job.build(),
        }
    }

    #[tokio::test]
    async fn test_idempotency_key_deduplicates_while_queued_or_active() {
        let queue = MemoryJobQueue::new();

        let first = queue.enqueue(scrape_job(Some("scrape:REMOTEOK"))).await.unwrap();
        let second = queue.enqueue(scrape_job(Some("scrape:REMOTEOK"))).await.unwrap();
        assert!(first.is_created());
        assert_eq!(second, EnqueueResult::Duplicate(first.job_id()));

        let claimed = queue.claim("w1", 10, Duration::from_secs(60)).await.unwrap();
        assert_eq!(claimed.len(), 1);
        let third = queue.enqueue(scrape_job(Some("scrape:REMOTEOK"))).await.unwrap();
        assert!(!third.is_created());

        assert!(queue.mark_completed(first.job_id(), "w1").await.unwrap());
        let fourth = queue.enqueue(scrape_job(Some("scrape:REMOTEOK"))).await.unwrap();
        assert!(fourth.is_created());
    }

    #[tokio::test]
    async fn test_claim_counts_attempts_and_respects_limit() {
        let queue = MemoryJobQueue::new();
        for _ in 0..3 {
            queue.enqueue(scrape_job(None)).await.unwrap();
        }

        let claimed = queue.claim("w1", 2, Duration::from_secs(60)).await.unwrap();
        assert_eq!(claimed.len(), 2);
        assert!(claimed.iter().all(|c| c.job.attempts == 1));
        assert!(claimed.iter().all(|c| c.job.status == JobStatus::Active));

        // Leased jobs are not handed out twice.
        let rest = queue.claim("w2", 10, Duration::from_secs(60)).await.unwrap();
        assert_eq!(rest.len(), 1);
    }

    #[tokio::test]
    async fn test_retry_then_terminal_failure() {
        let queue = MemoryJobQueue::new();
        let id = queue.enqueue(scrape_job(None)).await.unwrap().job_id();

        queue.claim("w1", 1, Duration::from_secs(60)).await.unwrap();
        let outcome = queue
            .mark_failed(id, "w1", "boom", ErrorKind::Retryable)
            .await
            .unwrap();
        assert!(matches!(outcome, FailureOutcome::Retrying { .. }));
        assert_eq!(queue.status(id).await.unwrap(), Some(JobStatus::Queued));

        queue.claim("w1", 1, Duration::from_secs(60)).await.unwrap();
        let outcome = queue
            .mark_failed(id, "w1", "boom again", ErrorKind::Retryable)
            .await
            .unwrap();
        assert_eq!(outcome, FailureOutcome::Failed);

        let job = queue.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 2);
        assert_eq!(job.last_error.as_deref(), Some("boom again"));
    }

    #[tokio::test]
    async fn test_expired_lease_is_redelivered() {
        let queue = MemoryJobQueue::new();
        let id = queue.enqueue(scrape_job(None)).await.unwrap().job_id();

        // Zero lease: the worker "crashed" right after claiming.
        let first = queue.claim("w1", 1, Duration::ZERO).await.unwrap();
        assert_eq!(first.len(), 1);

        let second = queue.claim("w2", 1, Duration::from_secs(60)).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, id);
        assert_eq!(second[0].job.attempts, 2);
        assert_eq!(second[0].job.worker_id.as_deref(), Some("w2"));
    }

    #[tokio::test]
    async fn test_expired_lease_on_last_attempt_fails_job() {
        let queue = MemoryJobQueue::new();
        let id = queue.enqueue(scrape_job(None)).await.unwrap().job_id();

        queue.claim("w1", 1, Duration::ZERO).await.unwrap();
        queue.claim("w2", 1, Duration::ZERO).await.unwrap();

        let third = queue.claim("w3", 1, Duration::from_secs(60)).await.unwrap();
        assert!(third.is_empty());
        assert_eq!(queue.status(id).await.unwrap(), Some(JobStatus::Failed));
    }

    #[tokio::test]
    async fn test_settled_job_ignores_late_failure() {
        let queue = MemoryJobQueue::new();
        let id = queue.enqueue(scrape_job(None)).await.unwrap().job_id();
        queue.claim("w1", 1, Duration::from_secs(60)).await.unwrap();

        assert!(queue.mark_completed(id, "w1").await.unwrap());
        let outcome = queue
            .mark_failed(id, "w1", "abandoned at shutdown", ErrorKind::Shutdown)
            .await
            .unwrap();

        assert_eq!(outcome, FailureOutcome::Stale);
        let job = queue.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.attempts, 1);
        assert!(job.last_error.is_none());
        assert!(!queue.mark_completed(id, "w1").await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_job_stays_failed() {
        let queue = MemoryJobQueue::new();
        let id = queue.enqueue(scrape_job(None)).await.unwrap().job_id();
        queue.claim("w1", 1, Duration::from_secs(60)).await.unwrap();

        let outcome = queue
            .mark_failed(id, "w1", "bad payload", ErrorKind::NonRetryable)
            .await
            .unwrap();
        assert_eq!(outcome, FailureOutcome::Failed);

        assert!(!queue.mark_completed(id, "w1").await.unwrap());
        assert_eq!(queue.status(id).await.unwrap(), Some(JobStatus::Failed));
    }

    #[tokio::test]
    async fn test_stale_worker_cannot_settle_redelivered_job() {
        let queue = MemoryJobQueue::new();
        let id = queue.enqueue(scrape_job(None)).await.unwrap().job_id();

        queue.claim("w1", 1, Duration::ZERO).await.unwrap();
        let redelivered = queue.claim("w2", 1, Duration::from_secs(60)).await.unwrap();
        assert_eq!(redelivered.len(), 1);

        assert!(!queue.mark_completed(id, "w1").await.unwrap());
        let outcome = queue
            .mark_failed(id, "w1", "late error", ErrorKind::Retryable)
            .await
            .unwrap();
        assert_eq!(outcome, FailureOutcome::Stale);

        let job = queue.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Active);
        assert_eq!(job.worker_id.as_deref(), Some("w2"));
        assert!(job.last_error.is_none());

        // A stale heartbeat does not extend the new holder's lease.
        let lease = job.lease_expires_at;
        queue.heartbeat(id, "w1", Duration::from_secs(3600)).await.unwrap();
        assert_eq!(queue.get(id).await.unwrap().unwrap().lease_expires_at, lease);

        assert!(queue.mark_completed(id, "w2").await.unwrap());
        assert_eq!(queue.status(id).await.unwrap(), Some(JobStatus::Completed));
    }
}

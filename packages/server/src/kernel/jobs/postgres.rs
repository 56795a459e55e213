//! PostgreSQL-backed job queue implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::{error, info, warn};

use super::job::{ErrorKind, FailureOutcome, Job, NewJob};
use super::queue::{ClaimedJob, EnqueueResult, JobQueue};
use crate::common::JobId;

const JOB_COLUMNS: &str = "id, kind, payload, status, attempts, max_attempts, backoff_strategy, \
     backoff_base_ms, backoff_max_ms, run_at, lease_expires_at, worker_id, last_error, \
     idempotency_key, created_at, updated_at";

/// PostgreSQL-backed job queue.
#[derive(Clone)]
pub struct PostgresJobQueue {
    pool: PgPool,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find the queued/active job holding an idempotency key.
    pub async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM queue_jobs
            WHERE idempotency_key = $1
              AND status IN ('queued', 'active')
            LIMIT 1
            "#
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    /// Fail active jobs whose lease expired on their last allowed attempt.
    ///
    /// Redelivering those would exceed `max_attempts`.
    async fn fail_exhausted_expired(&self) -> Result<()> {
        let ids: Vec<JobId> = sqlx::query_scalar(
            r#"
            UPDATE queue_jobs
            SET status = 'failed',
                last_error = COALESCE(last_error, 'lease expired on final attempt'),
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE status = 'active'
              AND lease_expires_at < NOW()
              AND attempts >= max_attempts
            RETURNING id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        for id in ids {
            error!(job_id = %id, "job failed permanently: lease expired on final attempt");
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn enqueue(&self, new: NewJob) -> Result<EnqueueResult> {
        // Check idempotency first
        if let Some(key) = &new.idempotency_key {
            if let Some(existing) = self.find_by_idempotency_key(key).await? {
                return Ok(EnqueueResult::Duplicate(existing.id));
            }
        }

        let job = Job::from_new(new, Utc::now());

        // The partial unique index settles races between concurrent producers.
        let inserted: Option<JobId> = sqlx::query_scalar(
            r#"
            INSERT INTO queue_jobs (
                id, kind, payload, status, attempts, max_attempts, backoff_strategy,
                backoff_base_ms, backoff_max_ms, run_at, idempotency_key, created_at, updated_at
            )
            VALUES ($1, $2, $3, 'queued', 0, $4, $5, $6, $7, $8, $9, NOW(), NOW())
            ON CONFLICT (idempotency_key)
                WHERE idempotency_key IS NOT NULL AND status IN ('queued', 'active')
                DO NOTHING
            RETURNING id
            "#,
        )
        .bind(job.id)
        .bind(job.kind)
        .bind(&job.payload)
        .bind(job.max_attempts)
        .bind(job.backoff_strategy)
        .bind(job.backoff_base_ms)
        .bind(job.backoff_max_ms)
        .bind(job.run_at)
        .bind(&job.idempotency_key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to insert queue job")?;

        match (inserted, &job.idempotency_key) {
            (Some(id), _) => {
                info!(job_id = %id, kind = %job.kind, "job enqueued");
                Ok(EnqueueResult::Created(id))
            }
            (None, Some(key)) => {
                let existing = self
                    .find_by_idempotency_key(key)
                    .await?
                    .with_context(|| format!("idempotency conflict on {} but no holder found", key))?;
                Ok(EnqueueResult::Duplicate(existing.id))
            }
            (None, None) => anyhow::bail!("queue insert returned no row"),
        }
    }

    async fn claim(&self, worker_id: &str, limit: usize, lease: Duration) -> Result<Vec<ClaimedJob>> {
        self.fail_exhausted_expired().await?;

        let jobs = sqlx::query_as::<_, Job>(&format!(
            r#"
            UPDATE queue_jobs
            SET status = 'active',
                attempts = attempts + 1,
                worker_id = $1,
                lease_expires_at = NOW() + ($3 || ' milliseconds')::INTERVAL,
                updated_at = NOW()
            WHERE id IN (
                SELECT id
                FROM queue_jobs
                WHERE (status = 'queued' AND run_at <= NOW())
                   OR (status = 'active' AND lease_expires_at < NOW() AND attempts < max_attempts)
                ORDER BY run_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(worker_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(lease.as_millis().to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to claim queue jobs")?;

        Ok(jobs.into_iter().map(ClaimedJob::new).collect())
    }

    async fn heartbeat(&self, job_id: JobId, worker_id: &str, lease: Duration) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE queue_jobs
            SET lease_expires_at = NOW() + ($1 || ' milliseconds')::INTERVAL,
                updated_at = NOW()
            WHERE id = $2 AND status = 'active' AND worker_id = $3
            "#,
        )
        .bind(lease.as_millis().to_string())
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_completed(&self, job_id: JobId, worker_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE queue_jobs
            SET status = 'completed',
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'active' AND worker_id = $2
            "#,
        )
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(
                job_id = %job_id,
                worker_id = %worker_id,
                "ignoring completion from a worker that no longer holds the job"
            );
            return Ok(false);
        }

        Ok(true)
    }

    async fn mark_failed(
        &self,
        job_id: JobId,
        worker_id: &str,
        error: &str,
        kind: ErrorKind,
    ) -> Result<FailureOutcome> {
        let mut tx = self.pool.begin().await?;

        let job = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM queue_jobs WHERE id = $1 FOR UPDATE"
        ))
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?
        .with_context(|| format!("queue job {} not found", job_id))?;

        if !job.is_held_by(worker_id) {
            tx.rollback().await?;
            warn!(
                job_id = %job_id,
                worker_id = %worker_id,
                status = ?job.status,
                error = %error,
                "ignoring failure from a worker that no longer holds the job"
            );
            return Ok(FailureOutcome::Stale);
        }

        let outcome = job.failure_outcome(kind, Utc::now());
        match outcome {
            FailureOutcome::Retrying { retry_at } => {
                sqlx::query(
                    r#"
                    UPDATE queue_jobs
                    SET status = 'queued',
                        run_at = $1,
                        last_error = $2,
                        worker_id = NULL,
                        lease_expires_at = NULL,
                        updated_at = NOW()
                    WHERE id = $3
                    "#,
                )
                .bind(retry_at)
                .bind(error)
                .bind(job_id)
                .execute(&mut *tx)
                .await?;

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
                sqlx::query(
                    r#"
                    UPDATE queue_jobs
                    SET status = 'failed',
                        last_error = $1,
                        lease_expires_at = NULL,
                        updated_at = NOW()
                    WHERE id = $2
                    "#,
                )
                .bind(error)
                .bind(job_id)
                .execute(&mut *tx)
                .await?;

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

        tx.commit().await?;
        Ok(outcome)
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM queue_jobs WHERE id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }
}

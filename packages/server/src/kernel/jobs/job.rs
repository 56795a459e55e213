//! Queue job model.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;

use crate::common::JobId;

// ============================================================================
// Enums
// ============================================================================

/// The two kinds of work the pipeline queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "queue_job_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Scrape,
    Embed,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Scrape => "scrape",
            JobKind::Embed => "embed",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `queued → active → {completed | failed}`; a retry moves `active` back to `queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "queue_job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Active,
    Completed,
    /// Terminal: attempts exhausted or a non-retryable error.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "backoff_strategy", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    Linear,
    #[default]
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorKind {
    /// Transient error - will retry if attempts remain
    #[default]
    Retryable,
    /// Permanent error - will not retry
    NonRetryable,
    /// Job was abandoned by graceful shutdown - will retry
    Shutdown,
}

impl ErrorKind {
    /// Whether this error kind should trigger a retry
    pub fn should_retry(&self) -> bool {
        matches!(self, ErrorKind::Retryable | ErrorKind::Shutdown)
    }
}

// ============================================================================
// Backoff
// ============================================================================

/// Delay between attempts of one job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub strategy: BackoffStrategy,
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            base: Duration::from_secs(1),
            max: Duration::from_secs(3600),
        }
    }
}

impl BackoffPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Fixed,
            base: delay,
            max: delay,
        }
    }

    pub fn linear(base: Duration, max: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Linear,
            base,
            max,
        }
    }

    /// Delay before the retry that follows failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self.strategy {
            BackoffStrategy::Fixed => Some(self.base),
            BackoffStrategy::Linear => self.base.checked_mul(attempt),
            BackoffStrategy::Exponential => 2u32
                .checked_pow(attempt - 1)
                .and_then(|factor| self.base.checked_mul(factor)),
        };

        delay.unwrap_or(self.max).min(self.max)
    }
}

// ============================================================================
// Job
// ============================================================================

#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub payload: serde_json::Value,
    pub status: JobStatus,

    // Attempts are counted when a job is claimed, so a crash mid-run still uses one up.
    pub attempts: i32,
    pub max_attempts: i32,

    pub backoff_strategy: BackoffStrategy,
    pub backoff_base_ms: i64,
    pub backoff_max_ms: i64,

    pub run_at: DateTime<Utc>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub last_error: Option<String>,
    pub idempotency_key: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Materialise a queued job from an enqueue request.
    pub fn from_new(new: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            kind: new.kind,
            payload: new.payload,
            status: JobStatus::Queued,
            attempts: 0,
            max_attempts: new.max_attempts.max(1),
            backoff_strategy: new.backoff.strategy,
            backoff_base_ms: duration_ms(new.backoff.base),
            backoff_max_ms: duration_ms(new.backoff.max),
            run_at: new.run_at.unwrap_or(now),
            lease_expires_at: None,
            worker_id: None,
            last_error: None,
            idempotency_key: new.idempotency_key,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            strategy: self.backoff_strategy,
            base: Duration::from_millis(self.backoff_base_ms.max(0) as u64),
            max: Duration::from_millis(self.backoff_max_ms.max(0) as u64),
        }
    }

    /// Whether `worker_id` currently holds this job.
    pub fn is_held_by(&self, worker_id: &str) -> bool {
        self.status == JobStatus::Active && self.worker_id.as_deref() == Some(worker_id)
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// What a failure of the current attempt leads to.
    pub fn failure_outcome(&self, kind: ErrorKind, now: DateTime<Utc>) -> FailureOutcome {
        if !kind.should_retry() || !self.has_attempts_left() {
            return FailureOutcome::Failed;
        }

        let delay = self.backoff().delay(self.attempts.max(1) as u32);
        let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
        FailureOutcome::Retrying {
            retry_at: now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Result of `mark_failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back to `queued`, claimable again at `retry_at`
    Retrying { retry_at: DateTime<Utc> },
    /// Terminal
    Failed,
    /// The job was not active for the reporting worker; nothing changed
    Stale,
}

/// Enqueue request.
#[derive(Debug, Clone, TypedBuilder)]
pub struct NewJob {
    pub kind: JobKind,
    pub payload: serde_json::Value,
    #[builder(default = 3)]
    pub max_attempts: i32,
    #[builder(default)]
    pub backoff: BackoffPolicy,
    /// At most one queued/active job exists per key.
    #[builder(default, setter(strip_option, into))]
    pub idempotency_key: Option<String>,
    #[builder(default, setter(strip_option))]
    pub run_at: Option<DateTime<Utc>>,
}

//! Job infrastructure for background execution.
//!
//! This module provides the kernel-level infrastructure for the pipeline's
//! queue. Business logic lives in `domains::jobs`.
//! - [`JobQueue`] - durable at-least-once queue contract
//! - [`PostgresJobQueue`] / [`MemoryJobQueue`] - its two implementations
//! - [`JobRegistry`] - maps job kinds to handlers
//! - [`JobWorker`] - long-running service that claims and executes jobs
//!
//! # Architecture
//!
//! ```text
//! trigger_scrape(source)
//!     │
//!     └─► JobQueue.enqueue(scrape)            idempotency key scrape:<SOURCE>
//!
//! JobWorker
//!     │
//!     ├─► JobQueue.claim (lease, attempts += 1)
//!     ├─► JobRegistry.execute ─► scrape handler ─► enqueue(embed)
//!     │                       └─► embed handler
//!     └─► mark_completed / mark_failed (retry with backoff or fail)
//! ```

mod job;
mod memory;
mod postgres;
mod queue;
mod registry;
mod worker;

pub use job::{
    BackoffPolicy, BackoffStrategy, ErrorKind, FailureOutcome, Job, JobKind, JobStatus, NewJob,
};
pub use memory::MemoryJobQueue;
pub use postgres::PostgresJobQueue;
pub use queue::{enqueue_command, ClaimedJob, CommandMeta, EnqueueResult, JobOptions, JobQueue};
pub use registry::{JobRegistry, PayloadError, SharedJobRegistry};
pub use worker::{classify_error, JobWorker, JobWorkerConfig};

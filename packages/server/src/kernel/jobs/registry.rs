//! Job registry for deserializing and executing jobs.
//!
//! The registry maps each [`JobKind`] to a handler that reconstructs the typed
//! job struct from its JSON payload and runs the domain logic. Workers claim
//! jobs from the queue and dispatch them here without knowing concrete types.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use thiserror::Error;

use super::job::JobKind;
use super::queue::{ClaimedJob, CommandMeta};
use crate::kernel::ServerDeps;

/// Type alias for the async handler function.
type BoxedHandler = Box<
    dyn Fn(serde_json::Value, Arc<ServerDeps>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>
        + Send
        + Sync,
>;

/// A payload that does not match its job kind. Never retried.
#[derive(Debug, Error)]
#[error("invalid {kind} payload: {source}")]
pub struct PayloadError {
    pub kind: JobKind,
    #[source]
    pub source: serde_json::Error,
}

/// Registry that maps job kinds to handlers.
///
/// # Example
///
/// ```ignore
/// let mut registry = JobRegistry::new();
/// registry.register::<ScrapeSourceJob, _, _>(|job, deps| async move {
///     run_scrape_job(job, &deps).await
/// });
///
/// // Later, in JobWorker
/// registry.execute(&claimed_job, deps.clone()).await?;
/// ```
#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<JobKind, BoxedHandler>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for `J::KIND`, replacing any previous one.
    pub fn register<J, F, Fut>(&mut self, handler: F)
    where
        J: CommandMeta + DeserializeOwned + Send + 'static,
        F: Fn(J, Arc<ServerDeps>) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let kind = J::KIND;
        let boxed_handler: BoxedHandler = Box::new(move |value, deps| {
            let handler = handler.clone();
            Box::pin(async move {
                let job: J = serde_json::from_value(value)
                    .map_err(|source| PayloadError { kind, source })?;
                handler(job, deps).await
            })
        });

        self.handlers.insert(kind, boxed_handler);
    }

    /// Execute a claimed job using its registered handler.
    pub async fn execute(&self, job: &ClaimedJob, deps: Arc<ServerDeps>) -> Result<()> {
        let handler = self
            .handlers
            .get(&job.kind())
            .ok_or_else(|| anyhow!("no handler registered for {} jobs", job.kind()))?;

        handler(job.job.payload.clone(), deps).await
    }

    pub fn is_registered(&self, kind: JobKind) -> bool {
        self.handlers.contains_key(&kind)
    }
}

/// Thread-safe registry wrapped in Arc.
pub type SharedJobRegistry = Arc<JobRegistry>;

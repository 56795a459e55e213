use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::kernel::jobs::{BackoffPolicy, BackoffStrategy};

/// Gemini client settings
#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub base_url: String,
    pub embed_model: String,
    pub completion_model: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
}

/// Embedding batch processor settings
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingSettings {
    /// Default `limit` for the new-postings sweep
    pub batch_size: usize,
    /// Upstream batch limit, also the default chunk size
    pub max_batch_request_size: usize,
    /// Attempts per chunk
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            batch_size: 200,
            max_batch_request_size: 100,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Settings the pipeline reads at runtime (carried in `ServerDeps`)
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub embedding: EmbeddingSettings,
    pub recommend_candidate_cap: usize,
    pub queue_max_attempts: i32,
    pub queue_backoff: BackoffPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            embedding: EmbeddingSettings::default(),
            recommend_candidate_cap: 2000,
            queue_max_attempts: 3,
            queue_backoff: BackoffPolicy::default(),
        }
    }
}

/// Queue worker process settings
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub poll_interval: Duration,
    pub max_concurrency: usize,
    pub job_timeout: Duration,
    pub lease: Duration,
    pub shutdown_timeout: Duration,
}

/// Periodic task settings
#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    /// `None` disables the embed sweep
    pub embed_sweep_interval: Option<Duration>,
    pub embed_sweep_timeout: Duration,
    /// 6-field cron expression for scrape triggers
    pub scrape_schedule: Option<String>,
    /// Sources triggered on schedule; empty means every known source
    pub scrape_sources: Vec<String>,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            embed_sweep_interval: Some(Duration::from_secs(60)),
            embed_sweep_timeout: Duration::from_secs(120),
            scrape_schedule: None,
            scrape_sources: Vec::new(),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub queue_database_url: String,
    pub gemini: GeminiSettings,
    pub pipeline: PipelineSettings,
    pub worker: WorkerSettings,
    pub schedule: ScheduleSettings,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars(&lookup);

        let database_url = vars.required("DATABASE_URL")?;
        let queue_database_url = vars
            .optional("QUEUE_DATABASE_URL")
            .unwrap_or_else(|| database_url.clone());

        let gemini = GeminiSettings {
            api_key: vars.required("GEMINI_API_KEY")?,
            base_url: vars
                .optional("GEMINI_BASE_URL")
                .unwrap_or_else(|| gemini_client::DEFAULT_BASE_URL.to_string()),
            embed_model: vars
                .optional("GEMINI_EMBED_MODEL")
                .unwrap_or_else(|| gemini_client::DEFAULT_EMBED_MODEL.to_string()),
            completion_model: vars
                .optional("GEMINI_COMPLETION_MODEL")
                .unwrap_or_else(|| gemini_client::DEFAULT_COMPLETION_MODEL.to_string()),
            max_retries: vars.parse("GEMINI_MAX_RETRIES", 3)?,
            retry_delay: vars.millis("GEMINI_RETRY_DELAY_MS", 500)?,
            request_timeout: vars.millis("GEMINI_REQUEST_TIMEOUT_MS", 60_000)?,
        };

        let pipeline = PipelineSettings {
            embedding: EmbeddingSettings {
                batch_size: vars.parse("EMBED_BATCH_SIZE", 200)?,
                max_batch_request_size: vars.parse("GEMINI_MAX_BATCH_SIZE", 100)?,
                max_retries: vars.parse("EMBED_BATCH_RETRIES", 3)?,
                retry_delay: vars.millis("EMBED_RETRY_DELAY_MS", 500)?,
            },
            recommend_candidate_cap: vars.parse("RECOMMEND_CANDIDATE_CAP", 2000)?,
            queue_max_attempts: vars.parse("QUEUE_MAX_ATTEMPTS", 3)?,
            queue_backoff: BackoffPolicy {
                strategy: BackoffStrategy::Exponential,
                base: vars.millis("QUEUE_BACKOFF_MS", 1000)?,
                max: vars.millis("QUEUE_BACKOFF_MAX_MS", 3_600_000)?,
            },
        };

        let worker = WorkerSettings {
            poll_interval: vars.millis("WORKER_POLL_INTERVAL_MS", 1000)?,
            max_concurrency: vars.parse::<usize>("WORKER_MAX_CONCURRENCY", 4)?.max(1),
            job_timeout: vars.millis("JOB_TIMEOUT_MS", 300_000)?,
            lease: vars.millis("JOB_LEASE_MS", 60_000)?,
            shutdown_timeout: vars.millis("SHUTDOWN_TIMEOUT_MS", 30_000)?,
        };

        let sweep_interval = vars.millis("EMBED_SWEEP_INTERVAL_MS", 60_000)?;
        let schedule = ScheduleSettings {
            embed_sweep_interval: (!sweep_interval.is_zero()).then_some(sweep_interval),
            embed_sweep_timeout: vars.millis("EMBED_SWEEP_TIMEOUT_MS", 120_000)?,
            scrape_schedule: vars.optional("SCRAPE_SCHEDULE"),
            scrape_sources: vars
                .optional("SCRAPE_SOURCES")
                .map(|list| {
                    list.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        };

        Ok(Self {
            database_url,
            queue_database_url,
            gemini,
            pipeline,
            worker,
            schedule,
        })
    }

    /// Convenience for tests: build from a fixed map.
    pub fn from_map(map: &HashMap<&str, &str>) -> Result<Self> {
        Self::from_vars(|key| map.get(key).map(|v| v.to_string()))
    }
}

struct Vars<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    /// Unset and blank are the same thing.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.optional(key)
            .with_context(|| format!("{} must be set", key))
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.optional(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a valid number", key)),
            None => Ok(default),
        }
    }

    fn millis(&self, key: &str, default: u64) -> Result<Duration> {
        self.parse(key, default).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DATABASE_URL", "postgres://localhost/jobfeed"),
            ("GEMINI_API_KEY", "test-key"),
        ])
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_map(&base()).unwrap();

        assert_eq!(config.queue_database_url, "postgres://localhost/jobfeed");
        assert_eq!(config.gemini.max_retries, 3);
        assert_eq!(config.gemini.embed_model, "gemini-embedding-001");
        assert_eq!(config.pipeline, PipelineSettings::default());
        assert_eq!(config.worker.max_concurrency, 4);
        assert_eq!(config.worker.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(
            config.schedule.embed_sweep_interval,
            Some(Duration::from_secs(60))
        );
        assert!(config.schedule.scrape_schedule.is_none());
        assert!(config.schedule.scrape_sources.is_empty());
    }

    #[test]
    fn test_overrides() {
        let mut vars = base();
        vars.insert("QUEUE_DATABASE_URL", "postgres://queue/jobs");
        vars.insert("GEMINI_MAX_BATCH_SIZE", "50");
        vars.insert("EMBED_SWEEP_INTERVAL_MS", "0");
        vars.insert("SCRAPE_SOURCES", "remoteok, wellfound,");

        let config = Config::from_map(&vars).unwrap();

        assert_eq!(config.queue_database_url, "postgres://queue/jobs");
        assert_eq!(config.pipeline.embedding.max_batch_request_size, 50);
        assert!(config.schedule.embed_sweep_interval.is_none());
        assert_eq!(config.schedule.scrape_sources, vec!["remoteok", "wellfound"]);
    }

    #[test]
    fn test_missing_required_names_variable() {
        let mut vars = base();
        vars.remove("GEMINI_API_KEY");

        let err = Config::from_map(&vars).unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_invalid_number_names_variable() {
        let mut vars = base();
        vars.insert("JOB_TIMEOUT_MS", "five minutes");

        let err = Config::from_map(&vars).unwrap_err();
        assert!(err.to_string().contains("JOB_TIMEOUT_MS"));
    }
}

//! Operator CLI for the job feed pipeline.
//!
//! Each command prints its result as JSON on stdout; logs go to stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jobfeed_core::common::PostingId;
use jobfeed_core::config::Config;
use jobfeed_core::domains::embeddings::{embed_jobs_by_ids, embed_new_jobs};
use jobfeed_core::domains::jobs::trigger_scrape;
use jobfeed_core::domains::recommendations::recommend;
use jobfeed_core::kernel::{GenerateOptions, ServerDeps};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pipeline_cli")]
#[command(about = "Trigger and inspect the job feed pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a scrape of one source (remoteok, weworkremotely, wellfound)
    Scrape { source: String },

    /// Embed postings that have no embedding yet
    EmbedNew {
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Embed specific postings
    EmbedIds {
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Rank postings for a user
    Recommend {
        user_id: String,
        #[arg(long, default_value_t = 0)]
        page: usize,
        #[arg(long, default_value_t = 10)]
        per_page: usize,
    },

    /// List the most recently scraped postings
    Recent {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Run a prompt through the generation model
    Generate {
        prompt: String,
        #[arg(long)]
        max_tokens: Option<u32>,
        #[arg(long)]
        temperature: Option<f32>,
    },
}

#[derive(Serialize)]
struct ScrapeResponse {
    job_id: String,
    created: bool,
}

#[derive(Serialize)]
struct GenerateResponse {
    text: String,
}

fn output<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,jobfeed_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    let store_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    let queue_pool = if config.queue_database_url == config.database_url {
        store_pool.clone()
    } else {
        PgPoolOptions::new()
            .max_connections(2)
            .connect(&config.queue_database_url)
            .await
            .context("Failed to connect to queue database")?
    };
    let deps = Arc::new(ServerDeps::from_pools(&config, store_pool, queue_pool)?);

    match cli.command {
        Commands::Scrape { source } => {
            let result = trigger_scrape(&source, &deps).await?;
            output(&ScrapeResponse {
                job_id: result.job_id().to_string(),
                created: result.is_created(),
            })
        }
        Commands::EmbedNew { limit } => output(&embed_new_jobs(limit, &deps).await?),
        Commands::EmbedIds { ids, chunk_size } => {
            let ids = ids
                .iter()
                .map(|id| PostingId::parse(id).with_context(|| format!("Invalid posting ID: {id}")))
                .collect::<Result<Vec<_>>>()?;
            output(&embed_jobs_by_ids(&ids, chunk_size, &deps).await)
        }
        Commands::Recommend {
            user_id,
            page,
            per_page,
        } => output(&recommend(&user_id, page, per_page, &deps).await?),
        Commands::Recent { limit } => output(&deps.store.list_recent_postings(limit).await?),
        Commands::Generate {
            prompt,
            max_tokens,
            temperature,
        } => {
            let defaults = GenerateOptions::default();
            let options = GenerateOptions {
                max_tokens: max_tokens.unwrap_or(defaults.max_tokens),
                temperature: temperature.unwrap_or(defaults.temperature),
            };
            let text = deps.embedding_service.generate(&prompt, options).await?;
            output(&GenerateResponse { text })
        }
    }
}

//! The two queue job kinds, their handlers and the scrape trigger.

pub mod commands;
pub mod handlers;

pub use commands::{EmbedPostingsJob, ScrapeSourceJob};
pub use handlers::{
    build_job_registry, handle_embed_postings, handle_scrape_source, register_pipeline_jobs,
    trigger_scrape,
};

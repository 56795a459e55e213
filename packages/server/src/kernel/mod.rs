//! Kernel module - pipeline infrastructure and dependencies.

pub mod deps;
pub mod gemini;
pub mod jobs;
pub mod page_fetcher;
pub mod scheduled_tasks;
pub mod test_dependencies;
pub mod traits;

pub use deps::ServerDeps;
pub use gemini::GeminiEmbeddingService;
pub use page_fetcher::HttpPageFetcher;
pub use scheduled_tasks::{run_embed_sweep, run_periodic_scrape, start_scheduler};
pub use test_dependencies::{MockEmbeddingService, MockPageFetcher, TestDependencies};
pub use traits::*;

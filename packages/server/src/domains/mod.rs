// Business domains
pub mod embeddings;
pub mod jobs;
pub mod postings;
pub mod recommendations;
pub mod scraping;

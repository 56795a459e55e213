//! Postings domain: canonical job listings, their embeddings and the
//! storage contract the pipeline runs against.

pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use memory::MemoryJobStore;
pub use models::{EmbeddedPosting, NewPosting, Posting, UserProfile};
pub use postgres::PostgresJobStore;
pub use store::JobStore;

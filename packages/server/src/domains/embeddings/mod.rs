//! Embedding Batch Processor and user vectorisation.

pub mod processor;
pub mod text;

pub use processor::{
    effective_chunk_size, embed_jobs_by_ids, embed_new_jobs, embed_user, embed_user_profile,
    EmbedSummary, UserEmbeddingError,
};
pub use text::{posting_text, user_text, MAX_DESCRIPTION_CHARS};

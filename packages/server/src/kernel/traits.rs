// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Batch chunking, retries at the chunk level and persistence live in
// `domains::embeddings`, built on top of these traits.
//
// Naming convention: Base* for trait names (e.g., BaseEmbeddingService)

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

pub use gemini_client::GenerateOptions;

// =============================================================================
// Embedding Service Trait (Infrastructure)
// =============================================================================

#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Upstream still failing after the client's own retries
    #[error("embedding service unavailable after {attempts} attempts: {message}")]
    Unavailable { attempts: u32, message: String },

    /// Batch response did not have one vector per input
    #[error("embedding shape mismatch: expected {expected} vectors, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("unrecognized embedding response: {0}")]
    UnrecognizedResponse(String),
}

#[async_trait]
pub trait BaseEmbeddingService: Send + Sync {
    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed many texts; the result has one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Generate text from a prompt.
    async fn generate(&self, prompt: &str, options: GenerateOptions)
        -> Result<String, EmbeddingError>;
}

// =============================================================================
// Page Fetcher Trait (Infrastructure - raw listing pages)
// =============================================================================

#[async_trait]
pub trait BasePageFetcher: Send + Sync {
    /// Fetch raw HTML. Fails on transport errors and non-2xx statuses.
    async fn fetch_html(&self, url: &str) -> Result<String>;
}

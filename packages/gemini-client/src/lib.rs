//! Pure Gemini REST API client
//!
//! A minimal client for the Gemini `embedContent`, `batchEmbedContents` and
//! `generateContent` endpoints. No pipeline logic lives here.
//!
//! # Example
//!
//! ```rust,ignore
//! use gemini_client::{GeminiClient, GenerateOptions};
//!
//! let client = GeminiClient::from_env()?;
//!
//! let vector = client.embed_one("Senior Rust engineer").await?;
//! let vectors = client.embed_batch(&["first", "second"]).await?;
//! let text = client.generate("Summarise this posting", GenerateOptions::default()).await?;
//! ```

pub mod error;
pub mod types;

pub use error::{GeminiError, Result};
pub use types::*;

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_EMBED_MODEL: &str = "gemini-embedding-001";
pub const DEFAULT_COMPLETION_MODEL: &str = "gemini-2.5-flash";

const API_KEY_HEADER: &str = "x-goog-api-key";
const MAX_ERROR_BODY_CHARS: usize = 800;

/// Pure Gemini API client.
#[derive(Clone)]
pub struct GeminiClient {
    http_client: Client,
    api_key: String,
    base_url: String,
    embed_model: String,
    completion_model: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl GeminiClient {
    /// Create a new client with the given API key and default settings.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            completion_model: DEFAULT_COMPLETION_MODEL.to_string(),
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }

    /// Create from environment variable `GEMINI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| GeminiError::Config("GEMINI_API_KEY not set".into()))?;
        Ok(Self::new(api_key))
    }

    /// Set a custom base URL (proxies, test servers).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self
    }

    pub fn with_completion_model(mut self, model: impl Into<String>) -> Self {
        self.completion_model = model.into();
        self
    }

    /// Retries after the first attempt, with linear backoff of `delay × attempt`.
    pub fn with_retry(mut self, max_retries: u32, delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = delay;
        self
    }

    /// Per-request timeout. Fails only if the TLS backend cannot initialise.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GeminiError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn embed_model(&self) -> &str {
        &self.embed_model
    }

    fn url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    /// Embed a single text.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbedContentRequest::new(&self.embed_model, text);
        let url = self.url(&self.embed_model, "embedContent");

        self.post_with_retry(&url, &request, parse_embedding).await
    }

    /// Embed many texts in one upstream call.
    ///
    /// The output has exactly one vector per input, in input order, or the call
    /// fails. A length mismatch is retried like a transport error. Individual
    /// items may come back empty when the upstream item was malformed.
    pub async fn embed_batch<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|t| EmbedContentRequest::new(&self.embed_model, t.as_ref()))
                .collect(),
        };
        let url = self.url(&self.embed_model, "batchEmbedContents");
        let expected = texts.len();

        self.post_with_retry(&url, &request, |body| {
            let vectors = parse_batch_embeddings(body)?;
            if vectors.len() != expected {
                return Err(GeminiError::ShapeMismatch {
                    expected,
                    actual: vectors.len(),
                });
            }
            Ok(vectors)
        })
        .await
    }

    /// Generate text from a prompt.
    pub async fn generate(&self, prompt: &str, options: GenerateOptions) -> Result<String> {
        let request = GenerateContentRequest::new(prompt, &options);
        let url = self.url(&self.completion_model, "generateContent");

        self.post_with_retry(&url, &request, parse_generated_text).await
    }

    /// POST `body` and normalise the JSON response with `parse`, retrying
    /// retryable failures up to `max_retries` times.
    async fn post_with_retry<B, T, F>(&self, url: &str, body: &B, parse: F) -> Result<T>
    where
        B: Serialize + ?Sized,
        F: Fn(&Value) -> Result<T>,
    {
        let attempts = self.max_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let start = std::time::Instant::now();

            let result = match self.post_once(url, body).await {
                Ok(json) => parse(&json),
                Err(e) => Err(e),
            };

            match result {
                Ok(value) => {
                    debug!(
                        url = %url,
                        attempt,
                        duration_ms = start.elapsed().as_millis(),
                        "Gemini request succeeded"
                    );
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= attempts => {
                    warn!(url = %url, attempts, error = %e, "Gemini retries exhausted");
                    return Err(GeminiError::Unavailable {
                        attempts,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = self.retry_delay * attempt;
                    warn!(
                        url = %url,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Gemini request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn post_once<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<Value> {
        let response = self
            .http_client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| GeminiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GeminiError::Api {
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| GeminiError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builder() {
        let client = GeminiClient::new("key-test")
            .with_base_url("http://localhost:9999/v1beta/")
            .with_embed_model("text-embedding-004");

        assert_eq!(client.api_key, "key-test");
        assert_eq!(client.base_url(), "http://localhost:9999/v1beta");
        assert_eq!(
            client.url(client.embed_model(), "embedContent"),
            "http://localhost:9999/v1beta/models/text-embedding-004:embedContent"
        );
    }

    #[tokio::test]
    async fn test_embed_batch_empty_input_skips_network() {
        // Unroutable base URL: any request would fail.
        let client = GeminiClient::new("key").with_base_url("http://127.0.0.1:1");
        let texts: [&str; 0] = [];

        let vectors = client.embed_batch(&texts).await.unwrap();
        assert!(vectors.is_empty());
    }
}

//! `BaseEmbeddingService` backed by the Gemini REST client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use gemini_client::{GeminiClient, GeminiError};

use super::traits::{BaseEmbeddingService, EmbeddingError, GenerateOptions};
use crate::config::GeminiSettings;

pub struct GeminiEmbeddingService {
    client: GeminiClient,
}

impl GeminiEmbeddingService {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }

    pub fn from_settings(settings: &GeminiSettings) -> Result<Self> {
        let client = GeminiClient::new(&settings.api_key)
            .with_base_url(&settings.base_url)
            .with_embed_model(&settings.embed_model)
            .with_completion_model(&settings.completion_model)
            .with_retry(settings.max_retries, settings.retry_delay)
            .with_timeout(settings.request_timeout)
            .context("Failed to create Gemini client")?;

        Ok(Self::new(client))
    }
}

impl From<GeminiError> for EmbeddingError {
    fn from(error: GeminiError) -> Self {
        match error {
            GeminiError::ShapeMismatch { expected, actual } => {
                EmbeddingError::ShapeMismatch { expected, actual }
            }
            GeminiError::UnrecognizedResponse(body) => EmbeddingError::UnrecognizedResponse(body),
            GeminiError::Unavailable { attempts, last } => EmbeddingError::Unavailable {
                attempts,
                message: last.to_string(),
            },
            other => EmbeddingError::Unavailable {
                attempts: 1,
                message: other.to_string(),
            },
        }
    }
}

#[async_trait]
impl BaseEmbeddingService for GeminiEmbeddingService {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.client.embed_one(text).await?)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(self.client.embed_batch(texts).await?)
    }

    async fn generate(
        &self,
        prompt: &str,
        options: GenerateOptions,
    ) -> Result<String, EmbeddingError> {
        Ok(self.client.generate(prompt, options).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_keeps_last_error_message() {
        let mapped: EmbeddingError = GeminiError::Unavailable {
            attempts: 4,
            last: Box::new(GeminiError::Api {
                status: 503,
                body: "overloaded".into(),
            }),
        }
        .into();

        match mapped {
            EmbeddingError::Unavailable { attempts, message } => {
                assert_eq!(attempts, 4);
                assert!(message.contains("503"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unrecognized_passes_through() {
        let mapped: EmbeddingError = GeminiError::UnrecognizedResponse("{}".into()).into();
        assert!(matches!(mapped, EmbeddingError::UnrecognizedResponse(_)));
    }
}

//! Error types for Gemini client.

use thiserror::Error;

/// Result type for Gemini client operations.
pub type Result<T> = std::result::Result<T, GeminiError>;

/// Gemini client errors.
#[derive(Debug, Error)]
pub enum GeminiError {
    /// Configuration error (missing API key, invalid settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network error (connection failed, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response from the API
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// Response body was not valid JSON
    #[error("Parse error: {0}")]
    Parse(String),

    /// Batch response did not contain one vector per input
    #[error("embedding shape mismatch: expected {expected} vectors, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// JSON was valid but in none of the shapes we know how to read
    #[error("Unrecognized response: {0}")]
    UnrecognizedResponse(String),

    /// Retries exhausted
    #[error("Gemini unavailable after {attempts} attempts: {last}")]
    Unavailable {
        attempts: u32,
        #[source]
        last: Box<GeminiError>,
    },
}

impl GeminiError {
    /// Whether another attempt at the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GeminiError::Network(_)
                | GeminiError::Api { .. }
                | GeminiError::Parse(_)
                | GeminiError::ShapeMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(GeminiError::Network("reset".into()).is_retryable());
        assert!(GeminiError::Api {
            status: 503,
            body: "overloaded".into()
        }
        .is_retryable());
        assert!(GeminiError::ShapeMismatch {
            expected: 3,
            actual: 2
        }
        .is_retryable());
        assert!(!GeminiError::UnrecognizedResponse("{}".into()).is_retryable());
        assert!(!GeminiError::Config("GEMINI_API_KEY not set".into()).is_retryable());
    }

    #[test]
    fn test_unavailable_keeps_last_error_as_source() {
        let err = GeminiError::Unavailable {
            attempts: 4,
            last: Box::new(GeminiError::Api {
                status: 500,
                body: "boom".into(),
            }),
        };

        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("API error 500: boom"));
        assert!(err.to_string().contains("after 4 attempts"));
    }
}

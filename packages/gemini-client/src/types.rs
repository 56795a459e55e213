//! Gemini API request types and response normalisation.
//!
//! The upstream API has shipped several response shapes for the same
//! endpoints over time, so responses are read as `serde_json::Value` and
//! normalised here instead of deserialised into a fixed struct.

use serde::Serialize;
use serde_json::Value;

use crate::error::{GeminiError, Result};

// =============================================================================
// Requests
// =============================================================================

/// A single text part of a content block.
#[derive(Debug, Clone, Serialize)]
pub struct Part {
    pub text: String,
}

/// Content block (`{"parts": [{"text": ...}]}`).
#[derive(Debug, Clone, Serialize)]
pub struct Content {
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part { text: text.into() }],
        }
    }
}

/// Body of `models/{model}:embedContent`, also used per item in batch requests.
#[derive(Debug, Clone, Serialize)]
pub struct EmbedContentRequest {
    pub model: String,
    pub content: Content,
}

impl EmbedContentRequest {
    pub fn new(model: &str, text: impl Into<String>) -> Self {
        Self {
            model: format!("models/{}", model),
            content: Content::text(text),
        }
    }
}

/// Body of `models/{model}:batchEmbedContents`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchEmbedRequest {
    pub requests: Vec<EmbedContentRequest>,
}

/// Generation parameters sent with `generateContent`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SafetySetting {
    pub category: &'static str,
    pub threshold: &'static str,
}

/// Body of `models/{model}:generateContent`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
    pub safety_settings: Vec<SafetySetting>,
}

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

impl GenerateContentRequest {
    pub fn new(prompt: impl Into<String>, options: &GenerateOptions) -> Self {
        Self {
            contents: vec![Content::text(prompt)],
            generation_config: GenerationConfig {
                max_output_tokens: options.max_tokens,
                temperature: options.temperature,
                top_p: 0.95,
                top_k: 40,
            },
            safety_settings: HARM_CATEGORIES
                .iter()
                .map(|category| SafetySetting {
                    category,
                    threshold: "BLOCK_NONE",
                })
                .collect(),
        }
    }
}

/// Caller-facing knobs for [`crate::GeminiClient::generate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerateOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            temperature: 0.7,
        }
    }
}

// =============================================================================
// Response normalisation
// =============================================================================

fn unrecognized(body: &Value) -> GeminiError {
    let mut text = body.to_string();
    if text.len() > 200 {
        let mut end = 200;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    GeminiError::UnrecognizedResponse(text)
}

/// Reads a JSON array of numbers. Anything else yields `None`.
fn as_vector(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

/// Normalise an `embedContent` response to a plain vector.
///
/// Accepted shapes, in order: `embedding.values`, `data[0].embedding.values`,
/// `data[0].embedding`, `embedding`.
pub fn parse_embedding(body: &Value) -> Result<Vec<f32>> {
    ["/embedding/values", "/data/0/embedding/values", "/data/0/embedding", "/embedding"]
        .iter()
        .find_map(|path| body.pointer(path).and_then(as_vector))
        .ok_or_else(|| unrecognized(body))
}

/// Normalise a `batchEmbedContents` response to one vector per item.
///
/// Reads `embeddings[]` (each `values` or a bare array) or `responses[]`
/// (each `embedding.values`, `embedding` or a bare array). Items that are not
/// numeric arrays become empty vectors so the caller can fail them
/// individually; the length check against the request happens in the client.
pub fn parse_batch_embeddings(body: &Value) -> Result<Vec<Vec<f32>>> {
    if let Some(items) = body.get("embeddings").and_then(Value::as_array) {
        return Ok(items
            .iter()
            .map(|item| {
                item.get("values")
                    .and_then(as_vector)
                    .or_else(|| as_vector(item))
                    .unwrap_or_default()
            })
            .collect());
    }

    if let Some(items) = body.get("responses").and_then(Value::as_array) {
        return Ok(items
            .iter()
            .map(|item| {
                item.pointer("/embedding/values")
                    .and_then(as_vector)
                    .or_else(|| item.get("embedding").and_then(as_vector))
                    .or_else(|| as_vector(item))
                    .unwrap_or_default()
            })
            .collect());
    }

    Err(unrecognized(body))
}

/// Normalise a `generateContent` response to its text.
pub fn parse_generated_text(body: &Value) -> Result<String> {
    ["/candidates/0/content/parts/0/text", "/candidates/0/text", "/text"]
        .iter()
        .find_map(|path| body.pointer(path).and_then(Value::as_str))
        .map(str::to_string)
        .ok_or_else(|| unrecognized(body))
}

//! Shared types for the inference client.
//!
//! These mirror the Ollama `/api/generate` and `/api/tags` wire formats, used
//! for both request building and response parsing.

use serde::{Deserialize, Serialize};

// ─── Request Types ───────────────────────────────────────────────────────────

/// Request body for `POST /api/generate`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Runtime options forwarded to the model (e.g. `num_ctx`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<ModelOptions>,
}

/// Ollama runtime options.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ModelOptions {
    /// Context window size requested from the runtime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
}

/// Per-call parameters layered over the client's defaults.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Model name; falls back to the client's writing model.
    pub model: Option<String>,
    /// Sampling temperature; falls back to the client's default.
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub num_ctx: Option<u32>,
}

impl GenerateOptions {
    /// Options pinned to a model with a specific temperature.
    pub fn with_model(model: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: Some(model.into()),
            temperature: Some(temperature),
            ..Self::default()
        }
    }
}

// ─── Response Types ──────────────────────────────────────────────────────────

/// One NDJSON line of a streaming response, or the whole non-streaming body.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GenerateChunk {
    /// Incremental text (streaming) or the full text (non-streaming).
    #[serde(default)]
    pub response: String,
    /// `true` on the final line of a stream.
    #[serde(default)]
    pub done: bool,
    /// Set instead of `response` when the endpoint fails after sending `200`.
    #[serde(default)]
    pub error: Option<String>,
}

/// Raw `/api/tags` response shape.
#[derive(Debug, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Option<Vec<TagModel>>,
}

/// Raw model entry from the tags API.
#[derive(Debug, Clone, Deserialize)]
pub struct TagModel {
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerateRequest {
        GenerateRequest {
            model: "qwen2.5:14b".to_string(),
            prompt: "write".to_string(),
            temperature: 0.7,
            stream: true,
            max_tokens: None,
            options: None,
        }
    }

    #[test]
    fn test_max_tokens_omitted_when_none() {
        let json = serde_json::to_string(&request()).unwrap();
        assert!(!json.contains("max_tokens"), "max_tokens should be omitted when None");
        assert!(!json.contains("options"), "options should be omitted when None");
    }

    #[test]
    fn test_options_included_when_set() {
        let mut req = request();
        req.max_tokens = Some(1_000_000);
        req.options = Some(ModelOptions { num_ctx: Some(4096) });
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"max_tokens\":1000000"));
        assert!(json.contains("\"num_ctx\":4096"));
    }

    #[test]
    fn test_chunk_defaults_missing_fields() {
        let chunk: GenerateChunk = serde_json::from_str(r#"{"model":"m"}"#).unwrap();
        assert_eq!(chunk.response, "");
        assert!(!chunk.done);
    }

    #[test]
    fn test_tags_response_without_models() {
        let tags: TagsResponse = serde_json::from_str("{}").unwrap();
        assert!(tags.models.is_none());
    }
}

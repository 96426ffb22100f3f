//! Ollama `/api/generate` client.
//!
//! Sends generation requests to a local endpoint and streams back text
//! fragments. There is no fallback chain and no retry: a failed call is
//! reported to the caller, which decides whether the run ends.

use std::time::Duration;

use futures::stream::{BoxStream, StreamExt};
use reqwest::Client as HttpClient;

use crate::config::BackendConfig;

use super::errors::InferenceError;
use super::streaming::{parse_ndjson_stream, parse_non_streaming_response};
use super::types::{
    GenerateChunk, GenerateOptions, GenerateRequest, ModelOptions, TagModel, TagsResponse,
};

/// Timeout for the lightweight `/api/tags` probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

// ─── OllamaClient ────────────────────────────────────────────────────────────

/// Client for the local generation endpoint.
///
/// Holds two HTTP clients: one with a total request timeout for
/// non-streaming calls, and one for streams that only bounds the connect
/// phase. Time-to-headers on a stream is bounded separately, and an open
/// stream is never cut off mid-body.
#[derive(Clone)]
pub struct OllamaClient {
    /// HTTP client for non-streaming requests.
    http: HttpClient,
    /// HTTP client for streaming requests (no total timeout).
    http_stream: HttpClient,
    config: BackendConfig,
}

impl OllamaClient {
    /// Create a client from the backend configuration.
    ///
    /// Does NOT check connectivity — that happens on the first request.
    pub fn from_config(config: BackendConfig) -> Result<Self, InferenceError> {
        let http = HttpClient::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: config.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let http_stream = HttpClient::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: config.base_url.clone(),
                reason: format!("failed to build streaming HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            http_stream,
            config,
        })
    }

    pub fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url())
    }

    fn build_request(&self, prompt: &str, opts: &GenerateOptions, stream: bool) -> GenerateRequest {
        GenerateRequest {
            model: opts
                .model
                .clone()
                .unwrap_or_else(|| self.config.writing_model.clone()),
            prompt: prompt.to_string(),
            temperature: opts.temperature.unwrap_or(self.config.writing_temperature),
            stream,
            max_tokens: opts.max_tokens,
            options: opts.num_ctx.map(|n| ModelOptions { num_ctx: Some(n) }),
        }
    }

    // ─── Generate (streaming) ───────────────────────────────────────────

    /// Send a streaming generate request.
    ///
    /// Returns a `Stream` of NDJSON chunks once response headers arrive. The
    /// wait for headers is bounded by `response_timeout`; reading the body
    /// is not.
    pub async fn generate_stream(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<BoxStream<'static, Result<GenerateChunk, InferenceError>>, InferenceError> {
        let url = self.generate_url();
        let body = self.build_request(prompt, opts, true);

        // Log the request metadata (not the full prompt, which grows every round)
        tracing::info!(
            url = %url,
            model = %body.model,
            prompt_chars = body.prompt.chars().count(),
            temperature = body.temperature,
            stream = body.stream,
            "=== GENERATE REQUEST ==="
        );

        let response_timeout = self.config.response_timeout();
        let send = self.http_stream.post(&url).json(&body).send();
        let response = match tokio::time::timeout(response_timeout, send).await {
            Ok(result) => result.map_err(|e| map_send_error(&url, e, response_timeout))?,
            Err(_) => {
                return Err(InferenceError::Timeout {
                    duration_secs: response_timeout.as_secs(),
                })
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        Ok(parse_ndjson_stream(response).boxed())
    }

    // ─── Generate (non-streaming) ───────────────────────────────────────

    /// Send a non-streaming generate request and return the trimmed text.
    pub async fn generate(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<String, InferenceError> {
        let url = self.generate_url();
        let body = self.build_request(prompt, opts, false);

        tracing::info!(
            url = %url,
            model = %body.model,
            prompt_chars = body.prompt.chars().count(),
            temperature = body.temperature,
            stream = body.stream,
            "=== GENERATE REQUEST ==="
        );

        let started = std::time::Instant::now();
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(&url, e, self.config.request_timeout()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| map_send_error(&url, e, self.config.request_timeout()))?;

        let chunk = parse_non_streaming_response(&body_text)?;

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            response_chars = chunk.response.chars().count(),
            "=== GENERATE RESPONSE ==="
        );

        Ok(chunk.response.trim().to_string())
    }

    // ─── Model listing ──────────────────────────────────────────────────

    /// List models installed in the Ollama instance (`GET /api/tags`).
    pub async fn list_models(&self) -> Result<Vec<TagModel>, InferenceError> {
        let url = format!("{}/api/tags", self.base_url());

        let response = self
            .http
            .get(&url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| map_send_error(&url, e, PROBE_TIMEOUT))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let tags: TagsResponse =
            response
                .json()
                .await
                .map_err(|e| InferenceError::MalformedResponse {
                    reason: format!("failed to parse tags response: {e}"),
                })?;

        Ok(tags.models.unwrap_or_default())
    }
}

/// Classify a `reqwest` send/read failure.
fn map_send_error(url: &str, e: reqwest::Error, timeout: Duration) -> InferenceError {
    if e.is_timeout() {
        InferenceError::Timeout {
            duration_secs: timeout.as_secs(),
        }
    } else if e.is_decode() || e.is_body() {
        InferenceError::StreamError {
            reason: e.to_string(),
        }
    } else {
        InferenceError::ConnectionFailed {
            endpoint: url.to_string(),
            reason: e.to_string(),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility — these types carry the context needed to build
//! meaningful log entries.

use thiserror::Error;

/// Errors that can occur while talking to the generation endpoint.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The endpoint did not produce a response within the configured timeout.
    #[error("inference timeout after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Non-2xx HTTP response from the endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// Byte stream failure or an undecodable NDJSON line.
    #[error("stream error: {reason}")]
    StreamError { reason: String },

    /// A non-streaming response body could not be decoded.
    #[error("malformed response: {reason}")]
    MalformedResponse { reason: String },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}

impl InferenceError {
    /// Whether the failure happened before any response was received.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            InferenceError::ConnectionFailed { .. } | InferenceError::Timeout { .. }
        )
    }

    /// Whether the endpoint reported that the requested model is missing.
    ///
    /// Ollama answers `404` with `model '…' not found` in that case.
    pub fn is_model_missing(&self) -> bool {
        matches!(
            self,
            InferenceError::HttpError { status: 404, body } if body.contains("not found")
        )
    }

    /// Short advice for the user when the cause is obvious.
    pub fn hint(&self) -> Option<&'static str> {
        if self.is_unreachable() {
            Some("is Ollama running?")
        } else if self.is_model_missing() {
            Some("model not installed, try `ollama pull <model>`")
        } else {
            None
        }
    }
}

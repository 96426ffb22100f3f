//! Inference Client — Ollama `/api/generate` client for local LLM inference.
//!
//! This module handles all communication with the local model endpoint:
//! - Streaming (NDJSON) and non-streaming generate calls
//! - Installed model listing via `/api/tags`
//! - Transport error classification
//!
//! The endpoint is stateless across calls: callers replay whatever context
//! the model needs in every prompt.

pub mod client;
pub mod errors;
pub mod streaming;
pub mod types;

// Re-exports for convenience
pub use client::OllamaClient;
pub use errors::InferenceError;
pub use types::{GenerateChunk, GenerateOptions, GenerateRequest, TagModel};

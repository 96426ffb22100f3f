//! The seam between the writing workflow and the model endpoint.
//!
//! Everything in `writer` talks to a [`GenerationBackend`] rather than to
//! [`OllamaClient`] directly, so runs can be driven by a scripted backend in
//! tests.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::BackendConfig;
use crate::inference::{GenerateChunk, GenerateOptions, InferenceError, OllamaClient};

/// Stream of decoded chunks for one request.
pub type ChunkStream = BoxStream<'static, Result<GenerateChunk, InferenceError>>;

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Open a streaming generate request.
    async fn stream(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<ChunkStream, InferenceError>;

    /// One-shot, non-streaming generate request.
    async fn complete(&self, prompt: &str, opts: &GenerateOptions)
        -> Result<String, InferenceError>;

    /// Names of the models the endpoint has installed.
    async fn list_models(&self) -> Result<Vec<String>, InferenceError>;
}

#[async_trait]
impl GenerationBackend for OllamaClient {
    async fn stream(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<ChunkStream, InferenceError> {
        self.generate_stream(prompt, opts).await
    }

    async fn complete(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<String, InferenceError> {
        self.generate(prompt, opts).await
    }

    async fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        let models = OllamaClient::list_models(self).await?;
        Ok(models.into_iter().map(|m| m.name).collect())
    }
}

// ─── Per-task request options ────────────────────────────────────────────────

/// Options for story rounds.
pub fn writing_options(config: &BackendConfig) -> GenerateOptions {
    GenerateOptions {
        max_tokens: config.max_tokens,
        ..GenerateOptions::with_model(&config.writing_model, config.writing_temperature)
    }
}

/// Options for writing-brief generation.
pub fn brief_options(config: &BackendConfig) -> GenerateOptions {
    GenerateOptions::with_model(&config.brief_model, config.brief_temperature)
}

/// Options for scoring a story.
pub fn evaluation_options(config: &BackendConfig) -> GenerateOptions {
    GenerateOptions {
        num_ctx: config.evaluation_num_ctx,
        ..GenerateOptions::with_model(&config.evaluation_model, config.evaluation_temperature)
    }
}

/// Options for revision suggestions.
pub fn suggestion_options(config: &BackendConfig) -> GenerateOptions {
    GenerateOptions::with_model(&config.evaluation_model, config.suggestion_temperature)
}

/// Options for the streaming rewrite.
pub fn revision_options(config: &BackendConfig) -> GenerateOptions {
    GenerateOptions {
        max_tokens: config.max_tokens,
        ..GenerateOptions::with_model(&config.writing_model, config.revision_temperature)
    }
}

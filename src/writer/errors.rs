//! Writer error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::inference::InferenceError;

/// Errors that can occur in the writing workflow.
#[derive(Debug, Error)]
pub enum WriterError {
    /// Target size was not a positive integer. The run never starts.
    #[error("invalid target size '{input}': expected a positive integer")]
    InvalidTarget { input: String },

    /// A run is already in flight; it must be stopped first.
    #[error("a generation run is already in progress")]
    AlreadyRunning,

    /// The instruction or content to work on is blank.
    #[error("nothing to {action}: content is empty")]
    EmptyContent { action: &'static str },

    /// Backend call failed.
    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// Writing the output file failed.
    #[error("failed to persist story to {path}: {reason}")]
    Persist { path: PathBuf, reason: String },

    /// The background task panicked or was aborted.
    #[error("generation task ended abnormally: {reason}")]
    TaskFailed { reason: String },
}

impl WriterError {
    /// Short advice for the user when the cause is obvious.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            WriterError::Inference(e) => e.hint(),
            _ => None,
        }
    }
}

impl From<tokio::task::JoinError> for WriterError {
    fn from(e: tokio::task::JoinError) -> Self {
        WriterError::TaskFailed {
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inference_error_is_transparent() {
        let err: WriterError = InferenceError::Timeout { duration_secs: 30 }.into();
        assert_eq!(err.to_string(), "inference timeout after 30s");
    }

    #[test]
    fn test_hint_passes_through_inference_errors() {
        let err: WriterError = InferenceError::Timeout { duration_secs: 30 }.into();
        assert_eq!(err.hint(), Some("is Ollama running?"));
        assert!(WriterError::AlreadyRunning.hint().is_none());
    }

    #[test]
    fn test_invalid_target_message() {
        let err = WriterError::InvalidTarget {
            input: "lots".into(),
        };
        assert!(err.to_string().contains("'lots'"));
    }
}

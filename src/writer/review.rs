//! Story review: scored evaluation, revision suggestions, and rewrites.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, MarkerConfig};
use crate::inference::GenerateOptions;

use super::archive::Archive;
use super::backend::{self, GenerationBackend};
use super::controller::{persist_story, stream_round};
use super::errors::WriterError;
use super::prompts;
use super::session::{emit, EventSender, GenerationEvent};
use super::splitter::TagSplitter;

/// Labels that introduce the overall score line in a report.
const SCORE_LABELS: &[&str] = &["Overall score", "总体评分"];

// ─── Scores ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    Excellent,
    Good,
    NeedsWork,
}

impl Grade {
    pub fn from_score(score: f32) -> Self {
        if score >= 8.0 {
            Grade::Excellent
        } else if score >= 6.0 {
            Grade::Good
        } else {
            Grade::NeedsWork
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Grade::Excellent => "excellent",
            Grade::Good => "good",
            Grade::NeedsWork => "needs work",
        }
    }
}

/// Pull the `X` out of an `Overall score: X/10` line.
///
/// Tolerates markdown emphasis and a full-width colon around the label.
pub fn extract_overall_score(report: &str) -> Option<f32> {
    for label in SCORE_LABELS {
        for (idx, _) in report.match_indices(label) {
            let rest = report[idx + label.len()..]
                .trim_start_matches(|c: char| c == ':' || c == '：' || c == '*' || c.is_whitespace());
            let number_len = rest
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .unwrap_or(rest.len());
            let (number, tail) = rest.split_at(number_len);
            let out_of_ten = tail
                .trim_start()
                .strip_prefix('/')
                .is_some_and(|t| t.trim_start().starts_with("10"));
            if number.is_empty() || !out_of_ten {
                continue;
            }
            if let Ok(score) = number.parse::<f32>() {
                return Some(score);
            }
        }
    }
    None
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub report: String,
    pub overall_score: Option<f32>,
}

impl Evaluation {
    pub fn grade(&self) -> Option<Grade> {
        self.overall_score.map(Grade::from_score)
    }
}

/// Result of a streamed rewrite.
#[derive(Debug)]
pub struct RevisionOutcome {
    pub text: String,
    pub annotation: String,
    /// A cancelled rewrite is returned but not saved.
    pub cancelled: bool,
    pub saved: Option<PathBuf>,
}

// ─── Reviewer ────────────────────────────────────────────────────────────────

pub struct Reviewer {
    backend: Arc<dyn GenerationBackend>,
    archive: Arc<dyn Archive>,
    evaluation: GenerateOptions,
    suggestion: GenerateOptions,
    revision: GenerateOptions,
    language: String,
    markers: MarkerConfig,
}

impl Reviewer {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        archive: Arc<dyn Archive>,
        config: &AppConfig,
    ) -> Self {
        Self {
            backend,
            archive,
            evaluation: backend::evaluation_options(&config.backend),
            suggestion: backend::suggestion_options(&config.backend),
            revision: backend::revision_options(&config.backend),
            language: config.generation.language.clone(),
            markers: config.generation.markers.clone(),
        }
    }

    /// Warn if the evaluation model is not installed. Never fails.
    async fn check_model(&self) {
        let Some(model) = self.evaluation.model.as_deref() else {
            return;
        };
        match self.backend.list_models().await {
            Ok(models) if models.iter().any(|m| m == model) => {}
            Ok(models) => tracing::warn!(
                model,
                available = ?models,
                "evaluation model is not installed, the request will likely fail"
            ),
            Err(e) => tracing::warn!(error = %e, "could not list models"),
        }
    }

    /// Score `content` against the brief it was written from.
    pub async fn evaluate(&self, instruction: &str, content: &str) -> Result<Evaluation, WriterError> {
        if content.trim().is_empty() {
            return Err(WriterError::EmptyContent { action: "evaluate" });
        }
        self.check_model().await;

        let prompt = prompts::evaluation_prompt(instruction, content);
        let report = self.backend.complete(&prompt, &self.evaluation).await?;
        let overall_score = extract_overall_score(&report);

        tracing::info!(
            report_chars = report.chars().count(),
            score = ?overall_score,
            "evaluation finished"
        );
        Ok(Evaluation {
            report,
            overall_score,
        })
    }

    /// Ask for concrete revision suggestions based on an evaluation report.
    pub async fn suggest_revisions(
        &self,
        instruction: &str,
        content: &str,
        report: &str,
    ) -> Result<String, WriterError> {
        if content.trim().is_empty() {
            return Err(WriterError::EmptyContent { action: "revise" });
        }
        let prompt = prompts::suggestions_prompt(instruction, content, report);
        Ok(self.backend.complete(&prompt, &self.suggestion).await?)
    }

    /// Stream a full rewrite that applies `suggestions`, then save it.
    pub async fn apply_revisions(
        &self,
        instruction: &str,
        content: &str,
        suggestions: &str,
        cancel: &CancellationToken,
        events: &EventSender,
    ) -> Result<RevisionOutcome, WriterError> {
        if content.trim().is_empty() {
            return Err(WriterError::EmptyContent { action: "revise" });
        }
        if suggestions.trim().is_empty() {
            return Err(WriterError::EmptyContent { action: "apply" });
        }

        emit(events, GenerationEvent::Reset);
        emit(events, GenerationEvent::Status("Applying revisions".into()));

        let prompt = prompts::revision_prompt(
            instruction,
            content,
            suggestions,
            &self.language,
            &self.markers,
        );
        let mut splitter = TagSplitter::new(self.markers.clone());
        let output = stream_round(
            self.backend.as_ref(),
            &prompt,
            &self.revision,
            &mut splitter,
            cancel,
            events,
        )
        .await?;

        let saved = if output.cancelled {
            emit(events, GenerationEvent::Status("Revision stopped, not saved".into()));
            None
        } else {
            persist_story(self.archive.as_ref(), &output.payload, events)
        };

        tracing::info!(
            chars = output.payload.chars().count(),
            cancelled = output.cancelled,
            saved = saved.is_some(),
            "revision finished"
        );
        Ok(RevisionOutcome {
            text: output.payload,
            annotation: output.annotation,
            cancelled: output.cancelled,
            saved,
        })
    }
}

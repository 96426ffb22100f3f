//! Auto-generate mode.
//!
//! Repeats brief → run → persist → wait until cancelled, until the optional
//! run limit is reached, or until a failure under the `stop` policy.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::config::{AutoConfig, BackendConfig, FailurePolicy};
use crate::inference::GenerateOptions;

use super::backend;
use super::controller::GenerationController;
use super::errors::WriterError;
use super::prompts;
use super::session::{emit, EventSender, GenerationEvent, StopReason};

/// Ask the backend for a fresh writing brief.
pub async fn generate_brief(
    controller: &GenerationController,
    opts: &GenerateOptions,
) -> Result<String, WriterError> {
    let brief = controller
        .backend()
        .complete(&prompts::brief_prompt(), opts)
        .await?;
    if brief.trim().is_empty() {
        return Err(WriterError::EmptyContent { action: "write from" });
    }
    Ok(brief)
}

/// What an auto session did before it ended.
#[derive(Debug, Default)]
pub struct AutoSummary {
    /// Runs attempted, including failed ones.
    pub runs: u32,
    /// Runs that reached their target.
    pub completed: u32,
    pub failures: u32,
    pub saved: Vec<PathBuf>,
    /// The error that ended the loop under the `stop` policy.
    pub fatal: Option<WriterError>,
}

pub struct AutoWriter {
    controller: GenerationController,
    brief_options: GenerateOptions,
    settings: AutoConfig,
}

impl AutoWriter {
    pub fn new(
        controller: GenerationController,
        backend_config: &BackendConfig,
        settings: AutoConfig,
    ) -> Self {
        Self {
            controller,
            brief_options: backend::brief_options(backend_config),
            settings,
        }
    }

    /// Loop until cancelled, the run limit is hit, or a fatal failure.
    pub async fn run(&self, cancel: &CancellationToken, events: &EventSender) -> AutoSummary {
        let mut summary = AutoSummary::default();

        tracing::info!(
            target_size = self.settings.target_size,
            interval_ms = self.settings.repeat_interval_ms,
            max_runs = ?self.settings.max_runs,
            on_failure = ?self.settings.on_failure,
            "=== AUTO MODE START ==="
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }
            if self.limit_reached(summary.runs) {
                break;
            }

            summary.runs += 1;
            let run = summary.runs;
            emit(events, GenerationEvent::Reset);
            emit(
                events,
                GenerationEvent::Status(format!("Auto run {run}: generating a brief")),
            );

            match self.run_once(cancel, events, &mut summary).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    summary.failures += 1;
                    tracing::error!(run, error = %e, "auto run failed");
                    emit(events, GenerationEvent::Status(format!("Auto run {run} failed: {e}")));
                    if self.settings.on_failure == FailurePolicy::Stop {
                        summary.fatal = Some(e);
                        break;
                    }
                }
            }

            // No pause after the last allowed run
            if self.limit_reached(summary.runs) {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.repeat_interval()) => {}
            }
        }

        tracing::info!(
            runs = summary.runs,
            completed = summary.completed,
            failures = summary.failures,
            "=== AUTO MODE END ==="
        );
        summary
    }

    fn limit_reached(&self, runs: u32) -> bool {
        let reached = self.settings.max_runs.is_some_and(|max| runs >= max);
        if reached {
            tracing::info!(runs, "run limit reached");
        }
        reached
    }

    /// One brief + run. `Ok(false)` means the run was cancelled.
    async fn run_once(
        &self,
        cancel: &CancellationToken,
        events: &EventSender,
        summary: &mut AutoSummary,
    ) -> Result<bool, WriterError> {
        let brief = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(false),
            brief = generate_brief(&self.controller, &self.brief_options) => brief?,
        };
        emit(events, GenerationEvent::Brief(brief.clone()));

        let outcome = self
            .controller
            .run(&brief, self.settings.target_size, cancel, events)
            .await;
        summary.saved.extend(outcome.saved);

        match outcome.stop {
            StopReason::TargetReached => {
                summary.completed += 1;
                Ok(true)
            }
            StopReason::Cancelled => Ok(false),
            StopReason::Failed(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use crate::inference::InferenceError;
    use crate::writer::controller::tests::{
        test_settings, MemoryArchive, Round, ScriptedBackend, Step,
    };

    fn auto_config(on_failure: FailurePolicy, max_runs: Option<u32>) -> AutoConfig {
        AutoConfig {
            repeat_interval_ms: 0,
            on_failure,
            max_runs,
            target_size: 2,
        }
    }

    fn writer(
        backend: ScriptedBackend,
        settings: AutoConfig,
    ) -> (AutoWriter, Arc<ScriptedBackend>, Arc<MemoryArchive>) {
        let backend = Arc::new(backend);
        let archive = Arc::new(MemoryArchive::default());
        let controller = GenerationController::new(backend.clone(), archive.clone(), test_settings());
        let auto = AutoWriter::new(controller, &BackendConfig::default(), settings);
        (auto, backend, archive)
    }

    #[tokio::test]
    async fn test_runs_until_limit() {
        let cancel = CancellationToken::new();
        let backend = ScriptedBackend::new(
            vec![
                Round::Stream(vec![Step::Done("第一")]),
                Round::Stream(vec![Step::Done("第二")]),
            ],
            cancel.clone(),
        )
        .with_replies(vec![Ok("brief one".into()), Ok("brief two".into())]);
        let (auto, backend, archive) = writer(backend, auto_config(FailurePolicy::Stop, Some(2)));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let summary = auto.run(&cancel, &tx).await;

        assert_eq!(summary.runs, 2);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.saved.len(), 2);
        assert_eq!(archive.saved(), vec!["第一".to_string(), "第二".to_string()]);

        // Brief request at 0.9, then the story round that follows it
        let prompts = backend.prompts();
        assert!(prompts[1].starts_with("brief one"));
        assert!(prompts[3].starts_with("brief two"));
        let options = backend.options.lock().unwrap().clone();
        assert_eq!(options[0].temperature, Some(0.9));

        let mut briefs = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let GenerationEvent::Brief(b) = event {
                briefs.push(b);
            }
        }
        assert_eq!(briefs, vec!["brief one".to_string(), "brief two".to_string()]);
    }

    #[tokio::test]
    async fn test_no_pause_after_last_run() {
        let cancel = CancellationToken::new();
        let backend = ScriptedBackend::new(vec![Round::Stream(vec![Step::Done("第一")])], cancel.clone())
            .with_replies(vec![Ok("brief one".into())]);
        let settings = AutoConfig {
            repeat_interval_ms: 60_000,
            ..auto_config(FailurePolicy::Stop, Some(1))
        };
        let (auto, _backend, _archive) = writer(backend, settings);
        let (tx, _rx) = mpsc::unbounded_channel();

        let summary = tokio::time::timeout(std::time::Duration::from_secs(5), auto.run(&cancel, &tx))
            .await
            .expect("auto mode should return right after its last run");
        assert_eq!(summary.runs, 1);
        assert_eq!(summary.completed, 1);
    }

    #[tokio::test]
    async fn test_stop_policy_ends_on_failure() {
        let cancel = CancellationToken::new();
        let backend = ScriptedBackend::new(vec![], cancel.clone()).with_replies(vec![Err(
            InferenceError::Timeout { duration_secs: 30 },
        )]);
        let (auto, _backend, archive) = writer(backend, auto_config(FailurePolicy::Stop, None));
        let (tx, _rx) = mpsc::unbounded_channel();

        let summary = auto.run(&cancel, &tx).await;

        assert_eq!(summary.runs, 1);
        assert_eq!(summary.failures, 1);
        assert!(matches!(
            summary.fatal,
            Some(WriterError::Inference(InferenceError::Timeout { .. }))
        ));
        assert!(archive.saved().is_empty());
    }

    #[tokio::test]
    async fn test_continue_policy_retries() {
        let cancel = CancellationToken::new();
        let backend = ScriptedBackend::new(
            vec![Round::Refuse, Round::Stream(vec![Step::Done("好的")])],
            cancel.clone(),
        )
        .with_replies(vec![Ok("brief one".into()), Ok("brief two".into())]);
        let (auto, _backend, archive) =
            writer(backend, auto_config(FailurePolicy::Continue, Some(2)));
        let (tx, _rx) = mpsc::unbounded_channel();

        let summary = auto.run(&cancel, &tx).await;

        assert_eq!(summary.runs, 2);
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.completed, 1);
        assert!(summary.fatal.is_none());
        assert_eq!(archive.saved(), vec!["好的".to_string()]);
    }

    #[tokio::test]
    async fn test_blank_brief_is_a_failure() {
        let cancel = CancellationToken::new();
        let backend =
            ScriptedBackend::new(vec![], cancel.clone()).with_replies(vec![Ok("   ".into())]);
        let (auto, backend, _archive) = writer(backend, auto_config(FailurePolicy::Stop, None));
        let (tx, _rx) = mpsc::unbounded_channel();

        let summary = auto.run(&cancel, &tx).await;

        assert!(matches!(summary.fatal, Some(WriterError::EmptyContent { .. })));
        assert_eq!(backend.prompts().len(), 1, "no story round without a brief");
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let backend = ScriptedBackend::new(vec![], cancel.clone());
        let (auto, backend, _archive) = writer(backend, auto_config(FailurePolicy::Stop, None));
        let (tx, _rx) = mpsc::unbounded_channel();

        let summary = auto.run(&cancel, &tx).await;

        assert_eq!(summary.runs, 0);
        assert!(backend.prompts().is_empty());
    }
}

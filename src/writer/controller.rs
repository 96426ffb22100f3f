//! Generation loop controller.
//!
//! Drives one run: repeated streaming rounds until the story reaches its
//! target size, the run is cancelled, or a backend call fails. Every
//! fragment is routed through a [`TagSplitter`] and published on the event
//! channel as it arrives. Whatever was accumulated is persisted exactly once
//! when the run ends.
//!
//! ```text
//! ┌─ cancelled? ─┐   ┌─ open stream ─┐   ┌─ fragment ─┐
//! │ complete?    │──►│ (round N)     │──►│ split/emit │──► done? cancelled?
//! └──────────────┘   └───────────────┘   └────────────┘
//!        ▲                                                     │
//!        └──────────────── fold round, pacing delay ◄──────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::{AppConfig, MarkerConfig};
use crate::inference::{GenerateOptions, InferenceError};

use super::archive::Archive;
use super::backend::{self, GenerationBackend};
use super::prompts;
use super::session::{
    emit, EventSender, GenerationEvent, GenerationSession, RunOutcome, StopReason,
};
use super::splitter::{SplitOutput, TagSplitter};

// ─── Settings ────────────────────────────────────────────────────────────────

/// Per-run knobs taken from configuration.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub options: GenerateOptions,
    /// Pause between a finished round and the next request.
    pub round_delay: Duration,
    pub language: String,
    /// Whether the first-round prompt explains the annotation markers.
    pub describe_markers: bool,
    pub markers: MarkerConfig,
}

impl ControllerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            options: backend::writing_options(&config.backend),
            round_delay: config.generation.round_delay(),
            language: config.generation.language.clone(),
            describe_markers: config.generation.describe_markers,
            markers: config.generation.markers.clone(),
        }
    }
}

// ─── Round streaming ─────────────────────────────────────────────────────────

/// Text produced by one streaming request.
#[derive(Debug, Default)]
pub(crate) struct RoundOutput {
    pub payload: String,
    pub annotation: String,
    /// The round was cut short by cancellation.
    pub cancelled: bool,
}

impl RoundOutput {
    fn absorb(&mut self, split: SplitOutput, events: &EventSender) {
        if !split.payload.is_empty() {
            self.payload.push_str(&split.payload);
            emit(events, GenerationEvent::Payload(split.payload));
        }
        if !split.annotation.is_empty() {
            self.annotation.push_str(&split.annotation);
            emit(events, GenerationEvent::Annotation(split.annotation));
        }
    }
}

/// Stream one request through `splitter`, publishing fragments as they
/// arrive.
///
/// Cancellation is observed before the request opens, while waiting for the
/// next fragment, and after each fragment. A cancelled round still returns
/// what it produced. The splitter is flushed when the round ends normally.
pub(crate) async fn stream_round(
    backend: &dyn GenerationBackend,
    prompt: &str,
    opts: &GenerateOptions,
    splitter: &mut TagSplitter,
    cancel: &CancellationToken,
    events: &EventSender,
) -> Result<RoundOutput, InferenceError> {
    let mut round = RoundOutput::default();

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            round.cancelled = true;
            return Ok(round);
        }
        opened = backend.stream(prompt, opts) => opened,
    };
    let mut stream = opened?;

    let mut fragments = 0usize;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                round.cancelled = true;
                break;
            }
            next = stream.next() => next,
        };

        // EOF without a done line still ends the round normally
        let Some(item) = next else { break };
        let chunk = item?;
        fragments += 1;

        round.absorb(splitter.process(&chunk.response), events);

        if chunk.done {
            break;
        }
        if cancel.is_cancelled() {
            round.cancelled = true;
            break;
        }
    }

    round.absorb(splitter.finish(), events);

    tracing::debug!(
        fragments,
        payload_chars = round.payload.chars().count(),
        annotation_chars = round.annotation.chars().count(),
        cancelled = round.cancelled,
        "round stream closed"
    );
    Ok(round)
}

/// Hand `content` to the archive once, reporting the result as status.
///
/// Blank content is not written.
pub(crate) fn persist_story(
    archive: &dyn Archive,
    content: &str,
    events: &EventSender,
) -> Option<PathBuf> {
    if content.trim().is_empty() {
        tracing::info!("nothing generated, skipping save");
        emit(events, GenerationEvent::Status("Nothing to save".into()));
        return None;
    }

    match archive.persist(content) {
        Ok(path) => {
            emit(
                events,
                GenerationEvent::Status(format!("Saved to {}", path.display())),
            );
            Some(path)
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to save story");
            emit(events, GenerationEvent::Status(format!("Save failed: {e}")));
            None
        }
    }
}

// ─── GenerationController ────────────────────────────────────────────────────

/// Runs generation sessions against a backend and persists the results.
///
/// Cheap to clone; clones share the backend and archive.
#[derive(Clone)]
pub struct GenerationController {
    backend: Arc<dyn GenerationBackend>,
    archive: Arc<dyn Archive>,
    settings: ControllerSettings,
}

impl GenerationController {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        archive: Arc<dyn Archive>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            backend,
            archive,
            settings,
        }
    }

    pub fn backend(&self) -> &Arc<dyn GenerationBackend> {
        &self.backend
    }

    fn round_prompt(&self, session: &GenerationSession) -> String {
        if session.rounds == 0 {
            prompts::first_round_prompt(
                &session.instruction,
                &self.settings.markers,
                self.settings.describe_markers,
            )
        } else {
            prompts::continuation_prompt(
                &session.instruction,
                &session.payload,
                &self.settings.language,
                &self.settings.markers,
            )
        }
    }

    /// Run one session to completion, cancellation, or failure.
    ///
    /// Never returns an error: failures are carried in
    /// [`RunOutcome::stop`] after the partial story has been persisted.
    pub async fn run(
        &self,
        instruction: &str,
        target_size: usize,
        cancel: &CancellationToken,
        events: &EventSender,
    ) -> RunOutcome {
        let session = GenerationSession::new(instruction, target_size);
        let span = tracing::info_span!(
            "generation",
            session_id = %session.id,
            target_size
        );
        self.run_session(session, cancel, events)
            .instrument(span)
            .await
    }

    async fn run_session(
        &self,
        mut session: GenerationSession,
        cancel: &CancellationToken,
        events: &EventSender,
    ) -> RunOutcome {
        tracing::info!(
            instruction_chars = session.instruction.chars().count(),
            "=== GENERATION START ==="
        );

        let mut splitter = TagSplitter::new(self.settings.markers.clone());

        let stop = loop {
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if session.is_complete() {
                break StopReason::TargetReached;
            }

            let round = session.rounds + 1;
            emit(
                events,
                GenerationEvent::Status(format!(
                    "Round {round}: {} / {} written",
                    session.size(),
                    session.target_size
                )),
            );

            let prompt = self.round_prompt(&session);
            let result = stream_round(
                self.backend.as_ref(),
                &prompt,
                &self.settings.options,
                &mut splitter,
                cancel,
                events,
            )
            .await;

            let output = match result {
                Ok(output) => output,
                Err(e) => {
                    // The failed round's partial text is dropped
                    tracing::error!(round, error = %e, "round failed");
                    break StopReason::Failed(e);
                }
            };

            session.payload.push_str(&output.payload);
            session.annotation.push_str(&output.annotation);
            session.rounds = round;

            let size = session.size();
            tracing::info!(round, size, cancelled = output.cancelled, "round finished");
            emit(events, GenerationEvent::RoundFinished { round, size });

            if output.cancelled {
                break StopReason::Cancelled;
            }
            if session.is_complete() {
                break StopReason::TargetReached;
            }

            tokio::select! {
                _ = cancel.cancelled() => break StopReason::Cancelled,
                _ = tokio::time::sleep(self.settings.round_delay) => {}
            }
        };

        let size = session.size();
        let message = match &stop {
            StopReason::TargetReached => format!("Writing complete: {size} written"),
            StopReason::Cancelled => format!("Stopped at {size} written"),
            StopReason::Failed(e) => format!("Generation failed: {e}"),
        };
        emit(events, GenerationEvent::Status(message));

        let saved = persist_story(self.archive.as_ref(), &session.payload, events);

        tracing::info!(
            rounds = session.rounds,
            size,
            stop = ?stop,
            saved = saved.is_some(),
            "=== GENERATION END ==="
        );

        RunOutcome {
            session,
            stop,
            saved,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

//! Session state and the events a run publishes.

use std::path::PathBuf;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::inference::InferenceError;

use super::metrics;

/// State of one generation run. Created fresh for every run.
#[derive(Debug, Clone)]
pub struct GenerationSession {
    pub id: Uuid,
    pub instruction: String,
    pub payload: String,
    pub annotation: String,
    pub target_size: usize,
    /// Rounds whose output was folded into `payload`.
    pub rounds: u32,
}

impl GenerationSession {
    pub fn new(instruction: impl Into<String>, target_size: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            instruction: instruction.into(),
            payload: String::new(),
            annotation: String::new(),
            target_size,
            rounds: 0,
        }
    }

    /// Current size of the payload in mixed units.
    pub fn size(&self) -> usize {
        metrics::size_metric(&self.payload)
    }

    pub fn is_complete(&self) -> bool {
        metrics::is_complete(&self.payload, self.target_size)
    }
}

/// Incremental update for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    /// Visible story text, in arrival order.
    Payload(String),
    /// Annotation text, in arrival order.
    Annotation(String),
    /// Human-readable progress or outcome message.
    Status(String),
    /// A round finished and was folded into the session.
    RoundFinished { round: u32, size: usize },
    /// A generated writing brief that the next run will follow.
    Brief(String),
    /// The display should be cleared (a new story or a rewrite begins).
    Reset,
}

/// Sending half of a run's event channel.
pub type EventSender = mpsc::UnboundedSender<GenerationEvent>;

/// Publish an event. A closed channel means nobody is watching, which is
/// not an error for the run.
pub(crate) fn emit(events: &EventSender, event: GenerationEvent) {
    let _ = events.send(event);
}

/// Why a run ended.
#[derive(Debug)]
pub enum StopReason {
    TargetReached,
    Cancelled,
    /// A backend call failed; no retry was attempted.
    Failed(InferenceError),
}

/// Final state of a run.
#[derive(Debug)]
pub struct RunOutcome {
    pub session: GenerationSession,
    pub stop: StopReason,
    /// Where the story was written, if it was.
    pub saved: Option<PathBuf>,
}

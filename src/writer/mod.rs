//! Writer — long-form story generation on top of the inference client.
//!
//! A run streams rounds from the model until the story reaches a target
//! size. Each fragment passes through the [`TagSplitter`], which separates
//! the model's reasoning (annotation) from the story text (payload).
//! Progress is published as [`GenerationEvent`]s, and the final story is
//! handed to an [`Archive`].
//!
//! Around the core loop:
//! - [`Workbench`]: single-run gate with start/stop for interactive use
//! - [`AutoWriter`]: unattended brief → story → save loop
//! - [`Reviewer`]: scored evaluation, revision suggestions, rewrites

pub mod archive;
pub mod auto;
pub mod backend;
pub mod controller;
pub mod errors;
pub mod metrics;
pub mod prompts;
pub mod review;
pub mod session;
pub mod splitter;
pub mod workbench;

// Re-exports for convenience
pub use archive::{Archive, TextArchive};
pub use auto::{generate_brief, AutoSummary, AutoWriter};
pub use backend::GenerationBackend;
pub use controller::{ControllerSettings, GenerationController};
pub use errors::WriterError;
pub use review::{Evaluation, Grade, Reviewer, RevisionOutcome};
pub use session::{EventSender, GenerationEvent, GenerationSession, RunOutcome, StopReason};
pub use splitter::{SplitOutput, TagSplitter};
pub use workbench::{parse_target, RunHandle, Workbench};

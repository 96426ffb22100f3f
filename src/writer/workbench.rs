//! Foreground entry point for interactive runs.
//!
//! The workbench owns the single-run gate: at most one generation task is
//! in flight, and the Stop action cancels it. The gate is released when the
//! task ends, whether it finished, was stopped, failed, or panicked.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::controller::GenerationController;
use super::errors::WriterError;
use super::session::{GenerationEvent, RunOutcome};

/// Parse a user-entered target size.
///
/// Surrounding whitespace is ignored; anything other than a positive
/// integer is rejected.
pub fn parse_target(input: &str) -> Result<usize, WriterError> {
    match input.trim().parse::<usize>() {
        Ok(target) if target > 0 => Ok(target),
        _ => Err(WriterError::InvalidTarget {
            input: input.to_string(),
        }),
    }
}

/// A run in flight.
///
/// `events` closes once the task has finished publishing; `task` then yields
/// the outcome.
pub struct RunHandle {
    pub events: mpsc::UnboundedReceiver<GenerationEvent>,
    pub cancel: CancellationToken,
    pub task: JoinHandle<RunOutcome>,
}

impl RunHandle {
    /// Wait for the run to end, discarding any unread events.
    pub async fn join(self) -> Result<RunOutcome, WriterError> {
        Ok(self.task.await?)
    }
}

type ActiveSlot = Arc<Mutex<Option<CancellationToken>>>;

/// Clears the active slot when the run task ends, even on panic.
struct ActiveGuard {
    slot: ActiveSlot,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }
}

pub struct Workbench {
    controller: GenerationController,
    active: ActiveSlot,
}

impl Workbench {
    pub fn new(controller: GenerationController) -> Self {
        Self {
            controller,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Validate inputs and spawn a run on the current tokio runtime.
    ///
    /// Fails without touching the backend if the target is invalid, the
    /// instruction is blank, or a run is already active.
    pub fn start(&self, instruction: &str, target_input: &str) -> Result<RunHandle, WriterError> {
        let target_size = parse_target(target_input)?;
        let instruction = instruction.trim().to_string();
        if instruction.is_empty() {
            return Err(WriterError::EmptyContent { action: "generate" });
        }

        let cancel = CancellationToken::new();
        {
            let mut slot = self.active.lock().unwrap_or_else(|e| e.into_inner());
            if slot.is_some() {
                tracing::warn!("start requested while a run is active");
                return Err(WriterError::AlreadyRunning);
            }
            *slot = Some(cancel.clone());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let guard = ActiveGuard {
            slot: self.active.clone(),
        };
        let controller = self.controller.clone();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let _guard = guard;
            controller.run(&instruction, target_size, &token, &tx).await
        });

        tracing::info!(target_size, "generation task spawned");
        Ok(RunHandle {
            events: rx,
            cancel,
            task,
        })
    }

    /// Request the active run to stop. Returns `false` if nothing was running.
    ///
    /// The run notices at its next poll point, saves what it has, and exits.
    pub fn stop(&self) -> bool {
        let slot = self.active.lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(token) => {
                tracing::info!("stop requested");
                token.cancel();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::writer::controller::ControllerSettings;
    use crate::writer::controller::tests::{
        test_settings, MemoryArchive, Round, ScriptedBackend, Step,
    };
    use crate::writer::session::StopReason;

    fn workbench(rounds: Vec<Round>) -> (Workbench, Arc<ScriptedBackend>, Arc<MemoryArchive>) {
        let backend = Arc::new(ScriptedBackend::new(rounds, CancellationToken::new()));
        let archive = Arc::new(MemoryArchive::default());
        let settings = ControllerSettings {
            round_delay: Duration::from_millis(10),
            ..test_settings()
        };
        let controller = GenerationController::new(backend.clone(), archive.clone(), settings);
        (Workbench::new(controller), backend, archive)
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("3000").unwrap(), 3000);
        assert_eq!(parse_target("  42\n").unwrap(), 42);
        for bad in ["", "abc", "-5", "0", "12.5"] {
            assert!(
                matches!(parse_target(bad), Err(WriterError::InvalidTarget { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_invalid_target_never_calls_backend() {
        let (bench, backend, _archive) = workbench(vec![]);

        let result = bench.start("brief", "lots");

        assert!(matches!(result, Err(WriterError::InvalidTarget { .. })));
        assert!(backend.prompts().is_empty());
        assert!(!bench.is_running());
    }

    #[tokio::test]
    async fn test_blank_instruction_rejected() {
        let (bench, _backend, _archive) = workbench(vec![]);
        assert!(matches!(
            bench.start("   ", "10"),
            Err(WriterError::EmptyContent { .. })
        ));
    }

    #[tokio::test]
    async fn test_second_start_rejected_until_stopped() {
        let (bench, _backend, archive) = workbench(vec![Round::Stream(vec![Step::Text("你好")])]);

        // The target is never reached, so the run keeps going until stopped
        let mut first = bench.start("brief", "100000").unwrap();
        assert!(bench.is_running());
        assert!(matches!(
            bench.start("brief", "10"),
            Err(WriterError::AlreadyRunning)
        ));

        // Let round 1 produce something before stopping
        loop {
            match first.events.recv().await {
                Some(GenerationEvent::RoundFinished { .. }) => break,
                Some(_) => continue,
                None => panic!("run ended before the first round finished"),
            }
        }
        assert!(bench.stop());
        let outcome = first.join().await.unwrap();
        assert!(matches!(outcome.stop, StopReason::Cancelled));
        assert!(!bench.is_running());
        assert_eq!(archive.saved(), vec!["你好".to_string()]);

        // Gate is free again
        let second = bench.start("brief", "1").unwrap();
        second.cancel.cancel();
        second.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_events_close_when_run_ends() {
        let (bench, _backend, _archive) =
            workbench(vec![Round::Stream(vec![Step::Done("你好")])]);

        let mut handle = bench.start("brief", "2").unwrap();
        let mut payload = String::new();
        while let Some(event) = handle.events.recv().await {
            if let GenerationEvent::Payload(text) = event {
                payload.push_str(&text);
            }
        }
        assert_eq!(payload, "你好");

        let outcome = handle.task.await.unwrap();
        assert!(matches!(outcome.stop, StopReason::TargetReached));
    }

    #[test]
    fn test_stop_without_run_is_noop() {
        let (bench, _backend, _archive) = workbench(vec![]);
        assert!(!bench.stop());
    }
}

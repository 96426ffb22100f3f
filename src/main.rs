//! novelsmith: long-form story generation against a local Ollama model.
//!
//! # Usage
//!
//! ```bash
//! # Write one story to 3000 units
//! novelsmith write --prompt "A lighthouse keeper finds a letter" --target 3000
//!
//! # Unattended: brief → story → save, forever (Ctrl-C to stop)
//! novelsmith auto --max-runs 5
//!
//! # Score a saved story, then rewrite it with the suggestions
//! novelsmith review --file generated_novels/3012字_20250307_090501.txt \
//!     --prompt "A lighthouse keeper finds a letter" --apply
//! ```

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use novelsmith::config::{self, AppConfig, FailurePolicy};
use novelsmith::inference::{InferenceError, OllamaClient};
use novelsmith::writer::backend::brief_options;
use novelsmith::writer::{
    generate_brief, AutoWriter, ControllerSettings, GenerationController, GenerationEvent,
    Reviewer, RunHandle, StopReason, TextArchive, Workbench, WriterError,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to novelsmith.yaml (default: $NOVELSMITH_CONFIG, then search upward)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Ollama base URL (overrides backend.base_url)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Model used for story rounds (overrides backend.writing_model)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Directory stories are saved to (overrides generation.output_dir)
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Directory for novelsmith.log (default: platform data directory)
    #[arg(long, global = true, env = "NOVELSMITH_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Echo the model's reasoning to stderr
    #[arg(long, global = true, default_value_t = false)]
    show_annotation: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write one story from a brief until it reaches the target size
    Write {
        /// The writing brief
        #[arg(long, short)]
        prompt: Option<String>,

        /// Read the brief from a file instead
        #[arg(long, conflicts_with = "prompt")]
        prompt_file: Option<PathBuf>,

        /// Target size in mixed units (CJK characters + Latin words)
        #[arg(long, short)]
        target: String,
    },

    /// Generate briefs and stories back to back until stopped
    Auto {
        /// Target size per story (overrides auto.target_size)
        #[arg(long)]
        target: Option<usize>,

        /// Stop after this many runs (overrides auto.max_runs)
        #[arg(long)]
        max_runs: Option<u32>,

        /// Pause between runs in milliseconds (overrides auto.repeat_interval_ms)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Keep going after a failed run instead of stopping
        #[arg(long, default_value_t = false)]
        keep_going: bool,
    },

    /// Print a freshly generated writing brief
    Brief,

    /// Score a story, optionally suggest revisions and apply them
    Review {
        /// Story file to review
        #[arg(long, short)]
        file: PathBuf,

        /// The brief the story was written from
        #[arg(long, short)]
        prompt: String,

        /// Also ask for concrete revision suggestions
        #[arg(long, default_value_t = false)]
        suggest: bool,

        /// Rewrite the story with the suggestions and save it (implies --suggest)
        #[arg(long, default_value_t = false)]
        apply: bool,
    },

    /// List installed models
    Models,
}

impl Cli {
    fn load_config(&self) -> Result<AppConfig> {
        let mut config =
            config::resolve_config(self.config.as_deref()).context("failed to load configuration")?;

        if let Some(url) = &self.base_url {
            config.backend.base_url = url.clone();
        }
        if let Some(model) = &self.model {
            config.backend.writing_model = model.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.generation.output_dir = dir.clone();
        }
        Ok(config)
    }
}

/// Print events as they arrive: story text to stdout, everything else to
/// stderr. Returns when the sending side is dropped.
async fn print_events(mut events: mpsc::UnboundedReceiver<GenerationEvent>, show_annotation: bool) {
    let mut stdout = std::io::stdout();
    while let Some(event) = events.recv().await {
        match event {
            GenerationEvent::Payload(text) => {
                let _ = write!(stdout, "{text}");
                let _ = stdout.flush();
            }
            GenerationEvent::Annotation(text) if show_annotation => eprint!("{text}"),
            GenerationEvent::Annotation(_) => {}
            GenerationEvent::Status(message) => eprintln!("\n[novelsmith] {message}"),
            GenerationEvent::Brief(brief) => eprintln!("\n[novelsmith] brief:\n{brief}\n"),
            GenerationEvent::RoundFinished { round, size } => {
                tracing::debug!(round, size, "round displayed");
            }
            GenerationEvent::Reset => {
                let _ = writeln!(stdout);
            }
        }
    }
}

/// Error message with a hint appended when the cause is obvious.
fn with_hint(e: &impl std::fmt::Display, hint: Option<&str>) -> String {
    match hint {
        Some(hint) => format!("{e} ({hint})"),
        None => e.to_string(),
    }
}

fn explain(e: WriterError) -> anyhow::Error {
    anyhow!(with_hint(&e, e.hint()))
}

fn explain_inference(e: InferenceError) -> anyhow::Error {
    anyhow!(with_hint(&e, e.hint()))
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n[novelsmith] stopping, saving what was written…");
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_path = novelsmith::init_tracing(cli.log_dir.as_deref())
        .context("failed to initialise logging")?;
    tracing::debug!(log = %log_path.display(), command = ?cli.command, "parsed command line");

    let config = cli.load_config()?;
    let client = OllamaClient::from_config(config.backend.clone())
        .context("failed to create the inference client")?;
    let backend = Arc::new(client.clone());
    let archive = Arc::new(TextArchive::new(config.generation.output_dir.clone()));
    let controller = GenerationController::new(
        backend.clone(),
        archive.clone(),
        ControllerSettings::from_config(&config),
    );

    match &cli.command {
        Command::Write {
            prompt,
            prompt_file,
            target,
        } => {
            let instruction = match (prompt, prompt_file) {
                (Some(p), _) => p.clone(),
                (None, Some(path)) => std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, None) => bail!("either --prompt or --prompt-file is required"),
            };

            let workbench = Workbench::new(controller);
            let RunHandle {
                events,
                cancel,
                task,
            } = workbench.start(&instruction, target).map_err(explain)?;
            cancel_on_ctrl_c(cancel);

            print_events(events, cli.show_annotation).await;
            let outcome = task.await.context("generation task ended abnormally")?;

            if let StopReason::Failed(e) = outcome.stop {
                bail!(
                    "generation failed after {} rounds: {}",
                    outcome.session.rounds,
                    with_hint(&e, e.hint())
                );
            }
        }

        Command::Auto {
            target,
            max_runs,
            interval_ms,
            keep_going,
        } => {
            let mut settings = config.auto.clone();
            if let Some(t) = target {
                settings.target_size = *t;
            }
            if max_runs.is_some() {
                settings.max_runs = *max_runs;
            }
            if let Some(ms) = interval_ms {
                settings.repeat_interval_ms = *ms;
            }
            if *keep_going {
                settings.on_failure = FailurePolicy::Continue;
            }

            let auto = AutoWriter::new(controller, &config.backend, settings);
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());

            let (tx, rx) = mpsc::unbounded_channel();
            let printer = tokio::spawn(print_events(rx, cli.show_annotation));
            let summary = auto.run(&cancel, &tx).await;
            drop(tx);
            printer.await?;

            eprintln!(
                "[novelsmith] {} runs, {} completed, {} failed, {} saved",
                summary.runs,
                summary.completed,
                summary.failures,
                summary.saved.len()
            );
            if let Some(e) = summary.fatal {
                bail!("auto mode stopped: {}", with_hint(&e, e.hint()));
            }
        }

        Command::Brief => {
            let brief = generate_brief(&controller, &brief_options(&config.backend))
                .await
                .map_err(explain)?;
            println!("{brief}");
        }

        Command::Review {
            file,
            prompt,
            suggest,
            apply,
        } => {
            let content = std::fs::read_to_string(file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let reviewer = Reviewer::new(backend, archive, &config);

            let evaluation = reviewer.evaluate(prompt, &content).await.map_err(explain)?;
            println!("{}", evaluation.report);
            match evaluation.grade() {
                Some(grade) => eprintln!(
                    "\n[novelsmith] overall score {:.1}/10 ({})",
                    evaluation.overall_score.unwrap_or_default(),
                    grade.label()
                ),
                None => eprintln!("\n[novelsmith] no overall score found in the report"),
            }

            if !(*suggest || *apply) {
                return Ok(());
            }

            let suggestions = reviewer
                .suggest_revisions(prompt, &content, &evaluation.report)
                .await
                .map_err(explain)?;
            println!("\n{suggestions}");

            if *apply {
                let cancel = CancellationToken::new();
                cancel_on_ctrl_c(cancel.clone());
                let (tx, rx) = mpsc::unbounded_channel();
                let printer = tokio::spawn(print_events(rx, cli.show_annotation));
                let outcome = reviewer
                    .apply_revisions(prompt, &content, &suggestions, &cancel, &tx)
                    .await;
                drop(tx);
                printer.await?;
                outcome.map_err(explain)?;
            }
        }

        Command::Models => {
            let models = client
                .list_models()
                .await
                .map_err(explain_inference)
                .context("failed to list models")?;
            for model in models {
                println!("{}\t{:.1} GB", model.name, model.size as f64 / 1e9);
            }
        }
    }

    Ok(())
}

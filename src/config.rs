//! Application configuration loading.
//!
//! Reads `novelsmith.yaml` and resolves environment variables. Every field has
//! a default, so a missing file (or a partial one) yields a working setup
//! pointed at a local Ollama instance.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::inference::InferenceError;

/// File name searched for when no explicit path is given.
pub const CONFIG_FILE_NAME: &str = "novelsmith.yaml";

/// Env var that points directly at a config file.
pub const CONFIG_ENV_VAR: &str = "NOVELSMITH_CONFIG";

// ─── Public Types ────────────────────────────────────────────────────────────

/// Top-level configuration (mirrors `novelsmith.yaml`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub generation: GenerationConfig,
    pub auto: AutoConfig,
}

/// Endpoint, model names, and transport timeouts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Server root, e.g. `http://localhost:11434`.
    pub base_url: String,
    /// Model used for story rounds and applied revisions.
    pub writing_model: String,
    /// Model used for evaluation and revision suggestions.
    pub evaluation_model: String,
    /// Model used to invent writing briefs in auto mode.
    pub brief_model: String,
    pub writing_temperature: f32,
    pub brief_temperature: f32,
    pub evaluation_temperature: f32,
    pub suggestion_temperature: f32,
    pub revision_temperature: f32,
    /// Forwarded as `max_tokens` on story rounds.
    pub max_tokens: Option<u32>,
    /// Context window requested for evaluation calls.
    pub evaluation_num_ctx: Option<u32>,
    pub connect_timeout_secs: u64,
    /// Time allowed until response headers arrive on a streaming call.
    pub response_timeout_secs: u64,
    /// Total time allowed for a non-streaming call (evaluation can be slow).
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            writing_model: "qwen2.5:14b".to_string(),
            evaluation_model: "qwen2.5:14b".to_string(),
            brief_model: "qwen2.5:14b".to_string(),
            writing_temperature: 0.7,
            brief_temperature: 0.9,
            evaluation_temperature: 0.3,
            suggestion_temperature: 0.4,
            revision_temperature: 0.5,
            max_tokens: Some(1_000_000),
            evaluation_num_ctx: Some(4096),
            connect_timeout_secs: 5,
            response_timeout_secs: 30,
            request_timeout_secs: 600,
        }
    }
}

impl BackendConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Annotation markers recognised in model output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    pub start: String,
    pub end: String,
    /// Misspellings of `end` that some models emit; rewritten before matching.
    pub end_aliases: Vec<String>,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            start: "<think>".to_string(),
            end: "</think>".to_string(),
            end_aliases: vec!["</thind>".to_string()],
        }
    }
}

/// Generation loop settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Pause between a finished round and the next request.
    pub round_delay_ms: u64,
    /// Directory that receives `<count>字_<timestamp>.txt` files.
    pub output_dir: PathBuf,
    /// Language the story is written in, named in continuation prompts.
    pub language: String,
    /// Append the annotation-marker convention to the first-round prompt.
    pub describe_markers: bool,
    pub markers: MarkerConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            round_delay_ms: 1000,
            output_dir: PathBuf::from("generated_novels"),
            language: "Chinese".to_string(),
            describe_markers: true,
            markers: MarkerConfig::default(),
        }
    }
}

impl GenerationConfig {
    pub fn round_delay(&self) -> Duration {
        Duration::from_millis(self.round_delay_ms)
    }
}

/// What auto mode does after a failed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// End auto mode and report the error.
    #[default]
    Stop,
    /// Wait the repeat interval and start a new run.
    Continue,
}

/// Auto-generate mode settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AutoConfig {
    /// Pause between a persisted story and the next brief.
    pub repeat_interval_ms: u64,
    pub on_failure: FailurePolicy,
    /// Stop after this many runs; unbounded when absent.
    pub max_runs: Option<u32>,
    /// Target size used for each auto run.
    pub target_size: usize,
}

impl Default for AutoConfig {
    fn default() -> Self {
        Self {
            repeat_interval_ms: 2000,
            on_failure: FailurePolicy::Stop,
            max_runs: None,
            target_size: 3000,
        }
    }
}

impl AutoConfig {
    pub fn repeat_interval(&self) -> Duration {
        Duration::from_millis(self.repeat_interval_ms)
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// Checks `NOVELSMITH_CONFIG` first, then searches upward from `start` for
/// `novelsmith.yaml`. Returns `None` when neither exists.
pub fn find_config_path(start: &Path) -> Option<PathBuf> {
    // 1. Check env var
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(expand_tilde(&path));
        if candidate.exists() {
            return Some(candidate);
        }
        tracing::warn!(path = %candidate.display(), "{CONFIG_ENV_VAR} points at a missing file");
    }

    // 2. Walk upward from `start`
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    None
}

/// Load and parse a configuration file.
///
/// Performs environment-variable interpolation on string values matching
/// `${VAR_NAME}` or `${VAR_NAME:-default}`.
pub fn load_config(path: &Path) -> Result<AppConfig, InferenceError> {
    let raw = std::fs::read_to_string(path).map_err(|e| InferenceError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    parse_config(&raw)
}

/// Parse configuration text (after env-var interpolation).
pub fn parse_config(raw: &str) -> Result<AppConfig, InferenceError> {
    let interpolated = interpolate_env_vars(raw);

    // An empty document deserializes as unit, not as an empty map
    if interpolated.trim().is_empty() {
        return Ok(AppConfig::default());
    }

    let config: AppConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| InferenceError::ConfigError {
            reason: format!("failed to parse config: {e}"),
        })?;

    validate(&config)?;
    Ok(config)
}

/// Resolve the effective configuration: explicit path, discovered file, or defaults.
pub fn resolve_config(explicit: Option<&Path>) -> Result<AppConfig, InferenceError> {
    if let Some(path) = explicit {
        tracing::info!(path = %path.display(), "loading config");
        return load_config(path);
    }

    let cwd = std::env::current_dir().unwrap_or_default();
    match find_config_path(&cwd) {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading config");
            load_config(&path)
        }
        None => {
            tracing::info!("no {CONFIG_FILE_NAME} found, using built-in defaults");
            Ok(AppConfig::default())
        }
    }
}

fn validate(config: &AppConfig) -> Result<(), InferenceError> {
    let markers = &config.generation.markers;
    if markers.start.is_empty() || markers.end.is_empty() {
        return Err(InferenceError::ConfigError {
            reason: "annotation markers must not be empty".into(),
        });
    }
    if markers.end_aliases.iter().any(String::is_empty) {
        return Err(InferenceError::ConfigError {
            reason: "end marker aliases must not be empty".into(),
        });
    }
    if config.backend.base_url.trim().is_empty() {
        return Err(InferenceError::ConfigError {
            reason: "backend.base_url must be set".into(),
        });
    }
    Ok(())
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some(idx) = expr.find(":-") {
        let var_name = &expr[..idx];
        let default = &expr[idx + 2..];
        std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolate_env_vars_with_default() {
        std::env::remove_var("__NOVELSMITH_TEST_UNSET__");
        let input = "${__NOVELSMITH_TEST_UNSET__:-http://fallback:11434}";
        assert_eq!(interpolate_env_vars(input), "http://fallback:11434");
    }

    #[test]
    fn test_interpolate_env_vars_with_value() {
        std::env::set_var("__NOVELSMITH_TEST_URL__", "http://gpu-box:11434");
        let input = "base_url: ${__NOVELSMITH_TEST_URL__:-http://localhost:11434}";
        assert_eq!(interpolate_env_vars(input), "base_url: http://gpu-box:11434");
        std::env::remove_var("__NOVELSMITH_TEST_URL__");
    }

    #[test]
    fn test_interpolate_no_vars() {
        let input = "plain text with no variables";
        assert_eq!(interpolate_env_vars(input), input);
    }

    #[test]
    fn test_expand_tilde() {
        let result = expand_tilde("~/novels");
        assert!(!result.starts_with('~'), "tilde should be expanded");
        assert!(result.ends_with("/novels"));
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.backend.base_url, "http://localhost:11434");
        assert_eq!(config.generation.round_delay_ms, 1000);
        assert_eq!(config.generation.markers.start, "<think>");
        assert_eq!(config.auto.on_failure, FailurePolicy::Stop);
    }

    #[test]
    fn test_partial_document_keeps_other_defaults() {
        let yaml = r#"
            backend:
              writing_model: "glm4:latest"
            auto:
              on_failure: continue
              max_runs: 5
        "#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.backend.writing_model, "glm4:latest");
        assert_eq!(config.backend.evaluation_model, "qwen2.5:14b");
        assert_eq!(config.auto.on_failure, FailurePolicy::Continue);
        assert_eq!(config.auto.max_runs, Some(5));
        assert_eq!(config.auto.repeat_interval_ms, 2000);
        assert_eq!(config.generation.output_dir, PathBuf::from("generated_novels"));
    }

    #[test]
    fn test_empty_marker_rejected() {
        let yaml = r#"
            generation:
              markers:
                start: ""
        "#;
        assert!(matches!(
            parse_config(yaml),
            Err(InferenceError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_find_config_path_walks_upward() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join(CONFIG_FILE_NAME), "").unwrap();
        let nested = root.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        // Only meaningful when the env override is not set in the test environment
        if std::env::var(CONFIG_ENV_VAR).is_err() {
            let found = find_config_path(&nested).unwrap();
            assert_eq!(found, root.path().join(CONFIG_FILE_NAME));
        }
    }
}

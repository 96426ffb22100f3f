pub mod config;
pub mod inference;
pub mod writer;

use std::path::{Path, PathBuf};

/// Log file name inside the data directory.
const LOG_FILE_NAME: &str = "novelsmith.log";

/// Rotated log files kept next to the current one.
const LOG_KEEP: u32 = 3;

/// Return the platform-standard data directory for novelsmith.
///
/// - macOS: `~/Library/Application Support/novelsmith/`
/// - Windows: `{FOLDERID_RoamingAppData}\novelsmith\`
/// - Linux: `$XDG_DATA_HOME/novelsmith/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.novelsmith/` only if none of the above can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("novelsmith");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".novelsmith")
}

/// Initialize the tracing subscriber, writing structured logs to `log_dir`
/// (the data directory when `None`).
///
/// On each startup:
/// 1. Rotates existing logs (novelsmith.log → .1 → .2 → .3, keeps last 3).
/// 2. Opens a fresh novelsmith.log with a line-flushing writer.
/// 3. Logs a startup banner with the log path for discoverability.
///
/// Returns the log file path. Stdout and stderr stay free for the story and
/// its progress output.
pub fn init_tracing(log_dir: Option<&Path>) -> std::io::Result<PathBuf> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = log_dir.map(Path::to_path_buf).unwrap_or_else(data_dir);
    std::fs::create_dir_all(&log_dir)?;

    let log_path = log_dir.join(LOG_FILE_NAME);
    rotate_log_file(&log_path, LOG_KEEP);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("novelsmith=info,warn"));

    fmt::fmt()
        .with_env_filter(filter)
        .with_writer(FlushingWriter::new(log_file))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "=== novelsmith starting ==="
    );

    Ok(log_path)
}

/// Rotate log files: `novelsmith.log` → `.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer that wraps `std::fs::File` and flushes after every write, so a
/// killed run still leaves its log lines on disk.
#[derive(Clone)]
struct FlushingWriter {
    file: std::sync::Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: std::sync::Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_log_file_shifts_and_drops_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join(LOG_FILE_NAME);
        let numbered = |i: u32| PathBuf::from(format!("{}.{i}", base.display()));

        std::fs::write(&base, "current").unwrap();
        std::fs::write(numbered(1), "one").unwrap();
        std::fs::write(numbered(3), "three").unwrap();

        rotate_log_file(&base, 3);

        assert!(!base.exists());
        assert_eq!(std::fs::read_to_string(numbered(1)).unwrap(), "current");
        assert_eq!(std::fs::read_to_string(numbered(2)).unwrap(), "one");
        assert!(!numbered(3).exists(), "oldest file is removed");
    }

    #[test]
    fn test_data_dir_is_namespaced() {
        let dir = data_dir();
        let name = dir.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name == "novelsmith" || name == ".novelsmith");
    }
}

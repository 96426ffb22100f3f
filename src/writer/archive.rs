//! Story persistence.
//!
//! Finished (or stopped) stories are written as UTF-8 text files named
//! `<size>字_<YYYYMMDD_HHMMSS>.txt`, where size is the mixed CJK + Latin
//! metric from [`super::metrics`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use super::errors::WriterError;
use super::metrics;

/// Destination for finished stories.
pub trait Archive: Send + Sync {
    /// Persist `content`, returning where it went.
    fn persist(&self, content: &str) -> Result<PathBuf, WriterError>;
}

/// Writes each story to its own file in a directory created on demand.
#[derive(Debug, Clone)]
pub struct TextArchive {
    dir: PathBuf,
}

impl TextArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// File name for `content` saved at `now`.
pub fn story_file_name(content: &str, now: DateTime<Local>) -> String {
    format!(
        "{}字_{}.txt",
        metrics::size_metric(content),
        now.format("%Y%m%d_%H%M%S")
    )
}

/// `dir/name`, or `dir/<stem>_<n>.txt` when that name is taken.
fn available_path(dir: &Path, name: &str) -> PathBuf {
    let first = dir.join(name);
    if !first.exists() {
        return first;
    }
    let stem = name.strip_suffix(".txt").unwrap_or(name);
    (2u32..)
        .map(|n| dir.join(format!("{stem}_{n}.txt")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

impl Archive for TextArchive {
    fn persist(&self, content: &str) -> Result<PathBuf, WriterError> {
        let path = available_path(&self.dir, &story_file_name(content, Local::now()));
        let to_err = |e: std::io::Error| WriterError::Persist {
            path: path.clone(),
            reason: e.to_string(),
        };

        std::fs::create_dir_all(&self.dir).map_err(to_err)?;

        // Write-then-rename so a crash never leaves a half-written story
        let tmp_path = path.with_extension("txt.tmp");
        std::fs::write(&tmp_path, content).map_err(to_err)?;
        std::fs::rename(&tmp_path, &path).map_err(to_err)?;

        tracing::info!(
            path = %path.display(),
            size = metrics::size_metric(content),
            bytes = content.len(),
            "story saved"
        );
        Ok(path)
    }
}

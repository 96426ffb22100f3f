//! Incremental annotation splitter for streamed model output.
//!
//! Models are asked to wrap their reasoning in `<think>…</think>`. Text
//! arrives in arbitrary fragments, so a marker can straddle two (or more)
//! fragments. The splitter routes every character to exactly one side,
//! payload or annotation, and holds back a trailing suffix that could still
//! turn out to be the start of a marker.

use crate::config::MarkerConfig;

/// Output of one `process` / `finish` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitOutput {
    /// Visible story text.
    pub payload: String,
    /// Annotation text, markers included.
    pub annotation: String,
}

impl SplitOutput {
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty() && self.annotation.is_empty()
    }
}

/// Stateful splitter; one instance per generation session.
#[derive(Debug, Clone)]
pub struct TagSplitter {
    markers: MarkerConfig,
    inside_annotation: bool,
    /// Unresolved tail of earlier input that may be a marker prefix.
    carry: String,
}

impl Default for TagSplitter {
    fn default() -> Self {
        Self::new(MarkerConfig::default())
    }
}

impl TagSplitter {
    /// Empty markers match everywhere and would never advance the scan, so
    /// an empty start or end falls back to the default and empty aliases
    /// are dropped.
    pub fn new(mut markers: MarkerConfig) -> Self {
        let defaults = MarkerConfig::default();
        if markers.start.is_empty() {
            tracing::warn!(fallback = %defaults.start, "empty start marker replaced");
            markers.start = defaults.start;
        }
        if markers.end.is_empty() {
            tracing::warn!(fallback = %defaults.end, "empty end marker replaced");
            markers.end = defaults.end;
        }
        markers.end_aliases.retain(|alias| !alias.is_empty());

        Self {
            markers,
            inside_annotation: false,
            carry: String::new(),
        }
    }

    /// Whether the last processed text left an annotation open.
    pub fn is_inside_annotation(&self) -> bool {
        self.inside_annotation
    }

    /// Text held back waiting for the next fragment.
    pub fn pending(&self) -> &str {
        &self.carry
    }

    /// Split one fragment.
    pub fn process(&mut self, fragment: &str) -> SplitOutput {
        let mut working = std::mem::take(&mut self.carry);
        working.push_str(fragment);
        let working = self.normalize(working);

        let mut out = SplitOutput::default();
        let mut rest: &str = &working;

        loop {
            if self.inside_annotation {
                match rest.find(self.markers.end.as_str()) {
                    Some(idx) => {
                        let end = idx + self.markers.end.len();
                        out.annotation.push_str(&rest[..end]);
                        rest = &rest[end..];
                        self.inside_annotation = false;
                    }
                    None => {
                        let split = rest.len() - self.held_suffix_len(rest);
                        out.annotation.push_str(&rest[..split]);
                        self.carry = rest[split..].to_string();
                        break;
                    }
                }
            } else {
                match rest.find(self.markers.start.as_str()) {
                    Some(idx) => {
                        out.payload.push_str(&rest[..idx]);
                        let after = idx + self.markers.start.len();
                        out.annotation.push_str(&rest[idx..after]);
                        rest = &rest[after..];
                        self.inside_annotation = true;
                    }
                    None => {
                        let split = rest.len() - self.held_suffix_len(rest);
                        out.payload.push_str(&rest[..split]);
                        self.carry = rest[split..].to_string();
                        break;
                    }
                }
            }
        }

        out
    }

    /// Flush held-back text and reset to the payload side.
    ///
    /// Called when a response stream ends: whatever is pending can no longer
    /// become a marker, so it goes to the side the splitter is currently on.
    pub fn finish(&mut self) -> SplitOutput {
        let rest = std::mem::take(&mut self.carry);
        let out = if self.inside_annotation {
            SplitOutput {
                payload: String::new(),
                annotation: rest,
            }
        } else {
            SplitOutput {
                payload: rest,
                annotation: String::new(),
            }
        };
        self.inside_annotation = false;
        out
    }

    /// Rewrite known misspellings of the end marker.
    fn normalize(&self, text: String) -> String {
        let mut text = text;
        for alias in &self.markers.end_aliases {
            if text.contains(alias.as_str()) {
                text = text.replace(alias.as_str(), &self.markers.end);
            }
        }
        text
    }

    /// Length of the longest suffix of `text` that is a proper prefix of any marker.
    fn held_suffix_len(&self, text: &str) -> usize {
        std::iter::once(&self.markers.start)
            .chain(std::iter::once(&self.markers.end))
            .chain(self.markers.end_aliases.iter())
            .filter_map(|marker| {
                marker
                    .char_indices()
                    .map(|(i, _)| i)
                    .filter(|&len| len > 0 && text.ends_with(&marker[..len]))
                    .max()
            })
            .max()
            .unwrap_or(0)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

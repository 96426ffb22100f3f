//! Story size metric.
//!
//! Mixed-script text is measured as CJK ideographs (one unit each) plus
//! runs of ASCII letters (one unit per word). This matches how a Chinese
//! word count (字数) is usually reported for text with embedded English.

/// Breakdown of the size metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeBreakdown {
    /// Code points in U+4E00..=U+9FFF.
    pub cjk_chars: usize,
    /// Maximal runs of ASCII letters.
    pub latin_words: usize,
}

impl SizeBreakdown {
    pub fn total(&self) -> usize {
        self.cjk_chars + self.latin_words
    }
}

fn is_cjk_ideograph(c: char) -> bool {
    ('\u{4E00}'..='\u{9FFF}').contains(&c)
}

/// Count CJK ideographs and Latin words in `text`.
pub fn measure(text: &str) -> SizeBreakdown {
    let mut breakdown = SizeBreakdown::default();
    let mut in_word = false;

    for c in text.chars() {
        if c.is_ascii_alphabetic() {
            if !in_word {
                breakdown.latin_words += 1;
                in_word = true;
            }
            continue;
        }
        in_word = false;
        if is_cjk_ideograph(c) {
            breakdown.cjk_chars += 1;
        }
    }

    breakdown
}

/// Size of `text` in mixed units.
pub fn size_metric(text: &str) -> usize {
    measure(text).total()
}

/// Whether `text` has reached `target` units.
pub fn is_complete(text: &str, target: usize) -> bool {
    size_metric(text) >= target
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_text_reaches_target() {
        assert_eq!(size_metric("你好world"), 3);
        assert!(is_complete("你好world", 3));
        assert!(!is_complete("你好", 3));
    }

    #[test]
    fn test_breakdown() {
        let b = measure("她说：“Hello, dear friend!” 然后离开了。");
        assert_eq!(b.cjk_chars, 7);
        assert_eq!(b.latin_words, 3);
        assert_eq!(b.total(), 10);
    }

    #[test]
    fn test_digits_punctuation_and_other_scripts_ignored() {
        assert_eq!(size_metric("2024 — !!! ありがとう 한국어"), 0);
        // Digits split letter runs
        assert_eq!(size_metric("abc123def"), 2);
        // Fullwidth Latin is not ASCII
        assert_eq!(size_metric("ＡＢＣ"), 0);
    }

    #[test]
    fn test_block_boundaries() {
        assert_eq!(size_metric("\u{4E00}\u{9FFF}"), 2);
        assert_eq!(size_metric("\u{4DFF}\u{A000}"), 0);
    }

    #[test]
    fn test_zero_target_always_complete() {
        assert!(is_complete("", 0));
    }

    #[test]
    fn test_monotonic_under_append() {
        let pieces = ["Once", " upon", "a", "时间", "，", "there", "1", "was", "一个人"];
        let mut text = String::new();
        let mut last = 0;
        for piece in pieces {
            text.push_str(piece);
            let size = size_metric(&text);
            assert!(size >= last, "metric dropped after appending {piece:?}");
            last = size;
        }
        for target in 0..=last + 1 {
            let mut text = String::new();
            let mut seen_complete = false;
            for piece in pieces {
                text.push_str(piece);
                let complete = is_complete(&text, target);
                assert!(!(seen_complete && !complete), "is_complete flipped back for {target}");
                seen_complete |= complete;
            }
        }
    }
}

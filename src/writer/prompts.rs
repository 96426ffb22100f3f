//! Prompt templates for every backend call.
//!
//! The backend keeps no conversation state, so the continuation prompt
//! replays the instruction and the whole story so far on every round.

use crate::config::MarkerConfig;

/// Constraints appended to every continuation round.
const CONTINUATION_RULES: &[&str] = &[
    "Continue from exactly where the existing text stops; do not restate or summarise it.",
    "Keep the story coherent and logically consistent with what has been written.",
    "Keep the pacing tight; avoid long-winded or repetitive description.",
    "Do not repeat scenes, sentences, or dialogue that already appear.",
    "Avoid clichéd plot turns; keep the story fresh.",
    "Keep events plausible; avoid exaggerated or implausible twists.",
];

/// Maximum characters of story sent with an evaluation request.
pub const EVALUATION_EXCERPT_CHARS: usize = 2000;

fn marker_note(markers: &MarkerConfig) -> String {
    format!(
        "You may put your private reasoning between {start} and {end}; \
         that text will not appear in the final story.",
        start = markers.start,
        end = markers.end,
    )
}

/// Prompt for the first round of a session.
pub fn first_round_prompt(instruction: &str, markers: &MarkerConfig, describe_markers: bool) -> String {
    if !describe_markers {
        return instruction.to_string();
    }
    format!(
        "{instruction}\n\n{note} For example:\n\
         {start}First I need to settle the protagonist and the setting, then plan a believable arc.{end}\n\
         The story itself...",
        note = marker_note(markers),
        start = markers.start,
        end = markers.end,
    )
}

/// Prompt for every round after the first.
pub fn continuation_prompt(
    instruction: &str,
    story_so_far: &str,
    language: &str,
    markers: &MarkerConfig,
) -> String {
    let mut rules: Vec<String> = CONTINUATION_RULES.iter().map(|r| r.to_string()).collect();
    rules.push(format!("Write in {language}."));
    rules.push("Output only the story text, with no headings, notes, or explanations.".to_string());
    rules.push(marker_note(markers));

    let numbered: String = rules
        .iter()
        .enumerate()
        .map(|(i, rule)| format!("{}. {rule}\n", i + 1))
        .collect();

    format!(
        "You are a novelist. Using the writing brief and the text written so far, \
         continue the story.\n\n\
         ## Writing brief\n{instruction}\n\n\
         ## Story so far\n{story_so_far}\n\n\
         ## Rules\n{numbered}"
    )
}

/// Prompt asking for a fresh writing brief (auto mode).
pub fn brief_prompt() -> String {
    "You are a creative-writing expert. Produce one original fiction writing brief.\n\
     Requirements:\n\
     1. Include a concrete setting, the main characters, and a direction for the plot.\n\
     2. Be inventive; avoid stock premises.\n\
     3. Keep it between 100 and 200 words.\n\
     4. Output only the brief itself, with no other commentary.\n\
     5. Every brief must differ from previous ones.\n\
     6. Favour romance as the genre."
        .to_string()
}

/// Prompt asking for a scored evaluation of a story.
pub fn evaluation_prompt(instruction: &str, content: &str) -> String {
    let excerpt: String = content.chars().take(EVALUATION_EXCERPT_CHARS).collect();
    let truncated = content.chars().count() > EVALUATION_EXCERPT_CHARS;
    let ellipsis = if truncated { "\n…(truncated)" } else { "" };

    format!(
        "Give a professional quality assessment of the story below, covering:\n\
         1. Plot coherence and plausibility\n\
         2. Characterisation and development\n\
         3. Style and language\n\
         4. Creativity and originality\n\
         5. Fit with the writing brief\n\n\
         ## Writing brief\n{instruction}\n\n\
         ## Story\n{excerpt}{ellipsis}\n\n\
         Score every aspect from 1 to 10 and give an overall score, using exactly this format:\n\
         - Overall score: X/10\n\
         - Plot: X/10\n\
         - Characters: X/10\n\
         - Language: X/10\n\
         - Creativity: X/10\n\
         - Brief fit: X/10\n\n\
         ## Detailed review\n[strengths and weaknesses]\n\n\
         ## Suggested improvements\n[3 to 5 concrete suggestions]"
    )
}

/// Prompt asking for concrete revision suggestions based on an evaluation.
pub fn suggestions_prompt(instruction: &str, content: &str, report: &str) -> String {
    format!(
        "You are a professional fiction editor. Based on the assessment below, give \
         concrete revision suggestions for the story.\n\n\
         ## Assessment\n{report}\n\n\
         ## Original writing brief\n{instruction}\n\n\
         ## Story\n{content}\n\n\
         Address the problems the assessment raises and provide:\n\
         1. Structural changes\n\
         2. Plot improvements\n\
         3. Ways to strengthen the characters\n\
         4. Language improvements\n\
         5. Three concrete rewrite examples showing original and revised text\n\n\
         Make every suggestion specific and actionable rather than general advice."
    )
}

/// Prompt asking for a full rewrite that applies revision suggestions.
pub fn revision_prompt(
    instruction: &str,
    content: &str,
    suggestions: &str,
    language: &str,
    markers: &MarkerConfig,
) -> String {
    format!(
        "You are a professional fiction editor and author. Rewrite the story below \
         following the revision suggestions.\n\n\
         ## Original writing brief\n{instruction}\n\n\
         ## Original story\n{content}\n\n\
         ## Revision suggestions\n{suggestions}\n\n\
         Keep the existing framework and main plot, improving it as suggested.\n\
         1. Output only the complete revised story, with no explanation.\n\
         2. Improve plot, characters, and language while keeping the story coherent.\n\
         3. Keep roughly the same length.\n\
         4. Write fluent {language}.\n\
         5. {note}",
        note = marker_note(markers),
    )
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_round_prompt_without_marker_note_is_raw_instruction() {
        let markers = MarkerConfig::default();
        assert_eq!(first_round_prompt("写一个故事", &markers, false), "写一个故事");
    }

    #[test]
    fn test_first_round_prompt_describes_markers() {
        let markers = MarkerConfig::default();
        let prompt = first_round_prompt("写一个故事", &markers, true);
        assert!(prompt.starts_with("写一个故事"));
        assert!(prompt.contains("<think>"));
        assert!(prompt.contains("</think>"));
    }

    #[test]
    fn test_continuation_prompt_replays_instruction_and_story() {
        let markers = MarkerConfig::default();
        let prompt = continuation_prompt("brief text", "第一章……", "Chinese", &markers);
        assert!(prompt.contains("## Writing brief\nbrief text"));
        assert!(prompt.contains("## Story so far\n第一章……"));
        assert!(prompt.contains("Write in Chinese."));
        assert!(prompt.contains("9. "), "constraint list should be numbered");
    }

    #[test]
    fn test_evaluation_prompt_truncates_long_content() {
        let long: String = "字".repeat(EVALUATION_EXCERPT_CHARS + 500);
        let prompt = evaluation_prompt("brief", &long);
        assert_eq!(prompt.matches('字').count(), EVALUATION_EXCERPT_CHARS);
        assert!(prompt.contains("(truncated)"));

        let short = evaluation_prompt("brief", "短篇");
        assert!(!short.contains("(truncated)"));
        assert!(short.contains("Overall score: X/10"));
    }

    #[test]
    fn test_revision_prompt_includes_suggestions() {
        let prompt = revision_prompt(
            "brief",
            "story",
            "tighten chapter two",
            "Chinese",
            &MarkerConfig::default(),
        );
        assert!(prompt.contains("## Revision suggestions\ntighten chapter two"));
        assert!(prompt.contains("Write fluent Chinese."));
    }
}

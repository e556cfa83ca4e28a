//! Prompts for audience-tailored slide analysis.
//!
//! Every prompt lives here so that the section markers the model is told to
//! produce, the markers the placeholder reuses, and the markers tests assert
//! on are one and the same constants.
//!
//! All builders are pure: identical inputs always produce identical text.

use crate::context::{ContextSnapshot, DEFAULT_AUDIENCE};

/// Heading of the one-paragraph summary section.
pub const SUMMARY_MARKER: &str = "### Summary";

/// Heading of the 2–3 bullet key points section.
pub const KEY_POINTS_MARKER: &str = "### Key Points";

/// Heading of the comma-separated emphasis keywords section.
pub const KEYWORDS_MARKER: &str = "### Emphasis Keywords";

/// Opening half of the emphasis marker pair.
pub const EMPHASIS_OPEN: &str = "**";

/// Closing half of the emphasis marker pair.
pub const EMPHASIS_CLOSE: &str = "**";

/// Line prefix for themes in the context-extraction reply.
pub const THEMES_PREFIX: &str = "Themes:";

/// Line prefix for concepts in the context-extraction reply.
pub const CONCEPTS_PREFIX: &str = "Concepts:";

/// Human-readable text shown for a slide whose analysis failed.
pub const FAILURE_MESSAGE: &str = "Analysis failed for this slide. Please retry.";

/// Wrap a term in the emphasis marker pair.
pub fn emphasize(term: &str) -> String {
    format!("{EMPHASIS_OPEN}{term}{EMPHASIS_CLOSE}")
}

fn audience_or_default(audience_description: &str) -> &str {
    let trimmed = audience_description.trim();
    if trimmed.is_empty() {
        DEFAULT_AUDIENCE
    } else {
        trimmed
    }
}

/// Build the base analysis prompt for one slide.
///
/// An empty or whitespace-only `audience_description` is replaced by
/// [`DEFAULT_AUDIENCE`].
pub fn build_prompt(slide_number: usize, total_slides: usize, audience_description: &str) -> String {
    let audience = audience_or_default(audience_description);
    format!(
        "You are explaining a presentation to the following audience: {audience}.\n\
         This image is slide {slide_number} of {total_slides}.\n\
         \n\
         Analyse the slide for this audience. Use their vocabulary and level of \
         expertise, and explain what matters to them rather than describing the layout.\n\
         \n\
         Always answer with exactly these three sections, in this order:\n\
         \n\
         {SUMMARY_MARKER}\n\
         One paragraph summarising what the slide communicates.\n\
         \n\
         {KEY_POINTS_MARKER}\n\
         - 2 to 3 bullet points with the key takeaways.\n\
         \n\
         {KEYWORDS_MARKER}\n\
         A comma-separated list of the terms the audience should remember. \
         Wrap each important term in {EMPHASIS_OPEN}double asterisks{EMPHASIS_CLOSE}, \
         for example {example}.\n\
         \n\
         Do not add any other sections, preamble or closing remarks.",
        example = emphasize("latency"),
    )
}

/// Build the prompt for a slide, appending what earlier slides established.
///
/// Falls back to [`build_prompt`] unchanged when no themes or concepts have
/// been accumulated yet.
pub fn build_slide_prompt(slide_number: usize, context: &ContextSnapshot) -> String {
    let mut prompt = build_prompt(
        slide_number,
        context.total_slides,
        &context.audience_description,
    );
    if context.has_signals() {
        prompt.push_str("\n\nEarlier slides in this presentation covered:\n");
        if !context.themes.is_empty() {
            prompt.push_str(&format!("- Themes: {}\n", context.themes.join(", ")));
        }
        if !context.concepts.is_empty() {
            prompt.push_str(&format!("- Concepts: {}\n", context.concepts.join(", ")));
        }
        prompt.push_str(
            "Connect this slide to them where it helps the audience, without repeating them.",
        );
    }
    prompt
}

/// Build the context-extraction prompt for a finished analysis.
pub fn build_context_prompt(analysis: &str, audience_description: &str) -> String {
    let audience = audience_or_default(audience_description);
    format!(
        "Below is an analysis of one presentation slide written for: {audience}.\n\
         List the themes and the concepts from it that matter most to this audience, \
         phrased the way this audience would phrase them.\n\
         \n\
         Reply with exactly two lines and nothing else:\n\
         {THEMES_PREFIX} theme one, theme two\n\
         {CONCEPTS_PREFIX} concept one, concept two\n\
         \n\
         Analysis:\n\"\"\"{analysis}\"\"\""
    )
}

/// Placeholder analysis for a failed slide, in the same structure as a
/// successful one.
pub fn failure_placeholder() -> String {
    format!(
        "{SUMMARY_MARKER}\n{FAILURE_MESSAGE}\n\n\
         {KEY_POINTS_MARKER}\n- No key points available: the analysis did not complete.\n\n\
         {KEYWORDS_MARKER}\n{}\n",
        emphasize("retry")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_contains_all_sections() {
        let p = build_prompt(2, 10, "junior engineers");
        assert!(p.contains(SUMMARY_MARKER));
        assert!(p.contains(KEY_POINTS_MARKER));
        assert!(p.contains(KEYWORDS_MARKER));
        assert!(p.contains("slide 2 of 10"));
        assert!(p.contains("junior engineers"));
    }

    #[test]
    fn empty_audience_uses_default_phrase() {
        for audience in ["", "   ", "\n"] {
            let p = build_prompt(1, 1, audience);
            assert!(p.contains(DEFAULT_AUDIENCE), "audience {audience:?}");
            assert!(!p.contains("audience: ."));
            assert!(!p.contains("None"));
        }
    }

    #[test]
    fn prompt_is_deterministic() {
        assert_eq!(build_prompt(3, 7, "cfo"), build_prompt(3, 7, "cfo"));
    }

    #[test]
    fn slide_prompt_without_signals_equals_base() {
        let snap = ContextSnapshot {
            audience_description: "designers".into(),
            total_slides: 4,
            ..Default::default()
        };
        assert_eq!(build_slide_prompt(1, &snap), build_prompt(1, 4, "designers"));
    }

    #[test]
    fn slide_prompt_lists_accumulated_context() {
        let snap = ContextSnapshot {
            audience_description: "designers".into(),
            total_slides: 4,
            themes: vec!["brand identity".into(), "colour".into()],
            concepts: vec!["grid".into()],
        };
        let p = build_slide_prompt(2, &snap);
        assert!(p.contains("Themes: brand identity, colour"));
        assert!(p.contains("Concepts: grid"));
    }

    #[test]
    fn context_prompt_names_both_prefixes() {
        let p = build_context_prompt("some analysis", "");
        assert!(p.contains(THEMES_PREFIX));
        assert!(p.contains(CONCEPTS_PREFIX));
        assert!(p.contains(DEFAULT_AUDIENCE));
        assert!(p.contains("some analysis"));
    }

    #[test]
    fn placeholder_has_same_structure() {
        let p = failure_placeholder();
        let summary = p.find(SUMMARY_MARKER).unwrap();
        let points = p.find(KEY_POINTS_MARKER).unwrap();
        let keywords = p.find(KEYWORDS_MARKER).unwrap();
        assert!(summary < points && points < keywords);
        assert!(p.contains(FAILURE_MESSAGE));
    }
}

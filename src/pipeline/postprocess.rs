//! Post-processing: deterministic cleanup of oracle-generated analysis text.
//!
//! Models occasionally wrap their whole answer in a ```markdown fence, emit
//! CRLF line endings, or sprinkle zero-width characters. None of that changes
//! meaning, so it is stripped here rather than argued about in the prompt.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to raw oracle output.
///
/// Rules (applied in order):
/// 1. Strip an outer markdown fence
/// 2. Normalise line endings (CRLF → LF)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 1
/// 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 6. Trim, then end with exactly one newline
pub fn clean_analysis(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

static RE_OUTER_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:markdown|md|text)?\r?\n(.*)\r?\n```\s*$").expect("valid fence regex")
});

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("valid blank-line regex"));

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| {
            !matches!(
                c,
                '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'
            )
        })
        .collect()
}

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}\n", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_fence() {
        let input = "```markdown\n### Summary\nText\n```";
        assert_eq!(clean_analysis(input), "### Summary\nText\n");
    }

    #[test]
    fn leaves_inner_code_blocks() {
        let input = "### Summary\n```rust\nfn main() {}\n```\nAfter";
        assert!(clean_analysis(input).contains("```rust"));
    }

    #[test]
    fn normalises_crlf_and_trailing_space() {
        assert_eq!(clean_analysis("a  \r\nb\t\r\n"), "a\nb\n");
    }

    #[test]
    fn collapses_blank_runs() {
        assert_eq!(clean_analysis("a\n\n\n\n\nb"), "a\n\nb\n");
    }

    #[test]
    fn removes_invisible_chars() {
        assert_eq!(clean_analysis("\u{FEFF}hel\u{200B}lo"), "hello\n");
    }

    #[test]
    fn blank_input_stays_blank() {
        assert_eq!(clean_analysis(" \n\t "), "");
    }
}

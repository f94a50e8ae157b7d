//! Text cleanup pipeline applied to every page before strategy dispatch.
//!
//! Each cleanup pass is a function `&str -> String` applied in sequence.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full cleanup pipeline on raw page text.
pub(crate) fn run_pipeline(text: &str, boilerplate: &[Regex], strip_links: bool) -> String {
    let mut result = normalize_encoding(text);

    result = filter_boilerplate(&result, boilerplate);
    if strip_links {
        result = strip_link_targets(&result);
    }
    result = collapse_whitespace(&result);

    result
}

/// Clean a one-line field such as a snippet or title.
pub(crate) fn clean_inline(text: &str) -> String {
    normalize_encoding(text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Pass 1: Encoding normalization
// ---------------------------------------------------------------------------

/// Drop replacement characters left by lossy decoding and control characters
/// other than newlines and tabs. Line endings become `\n`.
fn normalize_encoding(text: &str) -> String {
    text.replace("\r\n", "\n")
        .chars()
        .map(|c| if c == '\r' { '\n' } else { c })
        .filter(|&c| c != '\u{FFFD}' && c != '\u{FEFF}' && (!c.is_control() || c == '\n' || c == '\t'))
        .collect()
}

// ---------------------------------------------------------------------------
// Pass 2: Boilerplate lines
// ---------------------------------------------------------------------------

/// Drop lines matching any boilerplate/navigation pattern.
fn filter_boilerplate(text: &str, patterns: &[Regex]) -> String {
    if patterns.is_empty() {
        return text.to_string();
    }

    text.lines()
        .filter(|line| !patterns.iter().any(|re| re.is_match(line)))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 3: Link targets
// ---------------------------------------------------------------------------

/// `[text](url)` becomes `text`, images are removed, autolinks `<https://..>`
/// are dropped.
fn strip_link_targets(text: &str) -> String {
    static IMAGE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));
    static LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex"));
    static AUTOLINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<https?://[^>\s]+>").expect("valid regex"));

    let result = IMAGE_RE.replace_all(text, "");
    let result = LINK_RE.replace_all(&result, "$1");
    AUTOLINK_RE.replace_all(&result, "").into_owned()
}

// ---------------------------------------------------------------------------
// Pass 4: Whitespace
// ---------------------------------------------------------------------------

/// Collapse runs of spaces/tabs, trim line ends, keep at most one blank line.
fn collapse_whitespace(text: &str) -> String {
    static INLINE_WS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid regex"));
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    let lines = text
        .lines()
        .map(|line| INLINE_WS_RE.replace_all(line, " ").trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n");

    MULTI_BLANK_RE.replace_all(&lines, "\n\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> Vec<Regex> {
        vec![
            Regex::new(r"(?i)^\s*(home|menu|sign in)\s*$").unwrap(),
            Regex::new(r"(?i)^\s*(©|copyright\b).*$").unwrap(),
        ]
    }

    #[test]
    fn normalize_encoding_drops_invalid_and_control() {
        let input = "caf\u{FFFD}e\u{0007} ok\r\nnext\rlast\tTab";
        assert_eq!(normalize_encoding(input), "cafe ok\nnext\nlast\tTab");
    }

    #[test]
    fn filter_boilerplate_drops_matching_lines() {
        let input = "Home\nReal content here.\nSign In\n© 2024 Example Corp";
        assert_eq!(filter_boilerplate(input, &patterns()), "Real content here.");
    }

    #[test]
    fn filter_boilerplate_keeps_partial_matches() {
        let input = "Go home early, the menu says.";
        assert_eq!(filter_boilerplate(input, &patterns()), input);
    }

    #[test]
    fn strip_link_targets_keeps_text() {
        let input = "See [the docs](https://docs.rs/tokio) and ![logo](/logo.png) <https://x.io/a>.";
        assert_eq!(strip_link_targets(input), "See the docs and  .");
    }

    #[test]
    fn collapse_whitespace_normalizes() {
        let input = "  a   b\t\tc  \n\n\n\n d  \n";
        assert_eq!(collapse_whitespace(input), "a b c\n\n d");
    }

    #[test]
    fn pipeline_respects_link_toggle() {
        let input = "Menu\n[Tokio](https://tokio.rs)   runtime";
        assert_eq!(run_pipeline(input, &patterns(), true), "Tokio runtime");
        assert_eq!(
            run_pipeline(input, &patterns(), false),
            "[Tokio](https://tokio.rs) runtime"
        );
    }

    #[test]
    fn clean_inline_flattens() {
        assert_eq!(clean_inline("  An\u{FFFD}\n async   runtime "), "An async runtime");
    }
}

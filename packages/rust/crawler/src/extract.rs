//! HTML → readable text.
//!
//! Picks the main content container, drops page chrome, and converts the
//! remainder to Markdown-flavoured text with `htmd`.

use std::sync::LazyLock;

use scraper::{Html, Selector};

use sourcescout_shared::{ResearchError, Result};

/// Content containers, most specific first.
static CONTENT_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["main", "article", r#"[role="main"]"#, ".content", "body"]
        .iter()
        .map(|s| Selector::parse(s).expect("valid selector"))
        .collect()
});

/// Tags that never carry page content.
const CHROME_TAGS: [&str; 11] = [
    "script", "style", "noscript", "nav", "header", "footer", "aside", "iframe", "svg", "form",
    "button",
];

/// Extract the readable text of an HTML document.
pub fn html_to_text(html: &str) -> Result<String> {
    let content_html = main_content_html(html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(CHROME_TAGS.to_vec())
        .build();

    let text = converter
        .convert(&content_html)
        .map_err(|e| ResearchError::parse(format!("html conversion failed: {e}")))?;

    Ok(text.trim().to_string())
}

/// Whether a body should go through HTML extraction.
pub fn looks_like_html(content_type: Option<&str>, body: &str) -> bool {
    match content_type {
        Some(ct) if ct.contains("html") => true,
        Some(ct) if ct.starts_with("text/") || ct.contains("json") => false,
        _ => {
            let head = body.trim_start();
            head.starts_with('<')
                && head
                    .get(..200.min(head.len()))
                    .is_some_and(|h| h.to_ascii_lowercase().contains("<html") || h.to_ascii_lowercase().contains("<!doctype"))
        }
    }
}

fn main_content_html(html: &str) -> String {
    let doc = Html::parse_document(html);
    CONTENT_SELECTORS
        .iter()
        .find_map(|sel| doc.select(sel).next().map(|el| el.inner_html()))
        .unwrap_or_else(|| html.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_main_over_chrome() {
        let html = r#"<html><body>
            <nav><a href="/">Home</a></nav>
            <main><h1>Tokio</h1><p>An asynchronous runtime.</p></main>
            <footer>© 2024 Example</footer>
        </body></html>"#;
        let text = html_to_text(html).unwrap();
        assert!(text.contains("Tokio"));
        assert!(text.contains("asynchronous runtime"));
        assert!(!text.contains("Home"));
        assert!(!text.contains("2024"));
    }

    #[test]
    fn falls_back_to_body_without_chrome() {
        let html = r#"<html><body>
            <header>Site header</header>
            <script>track()</script>
            <p>Plain body text.</p>
            <aside>Related links</aside>
        </body></html>"#;
        let text = html_to_text(html).unwrap();
        assert!(text.contains("Plain body text."));
        assert!(!text.contains("track()"));
        assert!(!text.contains("Site header"));
        assert!(!text.contains("Related links"));
    }

    #[test]
    fn keeps_link_syntax_for_the_distiller() {
        let html = r#"<main><p>See <a href="https://docs.rs/tokio">the docs</a>.</p></main>"#;
        let text = html_to_text(html).unwrap();
        assert!(text.contains("[the docs](https://docs.rs/tokio)"));
    }

    #[test]
    fn detects_html_bodies() {
        assert!(looks_like_html(Some("text/html; charset=utf-8"), ""));
        assert!(!looks_like_html(Some("text/plain"), "<html>"));
        assert!(!looks_like_html(Some("application/json"), "{}"));
        assert!(looks_like_html(None, "<!DOCTYPE html><html></html>"));
        assert!(!looks_like_html(None, "just text"));
    }
}

//! Per-run source numbering for citation rendering.

use std::collections::HashMap;

/// Assigns 1-based source numbers to URLs in first-seen order.
///
/// Created by the caller for each run and passed into the pipeline, so
/// numbering never leaks between runs.
#[derive(Debug, Clone, Default)]
pub struct CitationRegistry {
    sources: Vec<String>,
    numbers: HashMap<String, usize>,
}

impl CitationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number for `url`, registering it if unseen.
    pub fn register(&mut self, url: &str) -> usize {
        if let Some(&n) = self.numbers.get(url) {
            return n;
        }
        self.sources.push(url.to_string());
        let n = self.sources.len();
        self.numbers.insert(url.to_string(), n);
        n
    }

    pub fn number(&self, url: &str) -> Option<usize> {
        self.numbers.get(url).copied()
    }

    /// `(number, url)` pairs in number order.
    pub fn sources(&self) -> impl Iterator<Item = (usize, &str)> {
        self.sources.iter().enumerate().map(|(i, url)| (i + 1, url.as_str()))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

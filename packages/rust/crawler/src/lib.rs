//! Page fetching for research steps.
//!
//! This crate provides:
//! - [`Crawler`]: batch fetch interface with per-URL failure isolation
//! - [`engine`]: HTTP crawler with bounded concurrency and rate-limit backoff
//! - [`extract`]: HTML to readable text

pub mod engine;
pub mod extract;

use async_trait::async_trait;

pub use engine::HttpCrawler;
pub use extract::html_to_text;

// ---------------------------------------------------------------------------
// FetchOutcome
// ---------------------------------------------------------------------------

/// Result of fetching one URL. `Failed` is the sentinel that stands in for
/// an error, so a batch never partially fails at the call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Text(String),
    Failed { reason: String },
}

impl FetchOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

// ---------------------------------------------------------------------------
// Crawler
// ---------------------------------------------------------------------------

/// Fetches pages as normalized text.
#[async_trait]
pub trait Crawler: Send + Sync {
    /// Fetch every URL. The output has the same length and order as `urls`.
    async fn fetch(&self, urls: &[String]) -> Vec<FetchOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_accessors() {
        assert!(!FetchOutcome::Text("hi".into()).is_failed());
        let failed = FetchOutcome::failed("HTTP 404");
        assert!(failed.is_failed());
        assert_eq!(failed, FetchOutcome::Failed { reason: "HTTP 404".into() });
    }
}

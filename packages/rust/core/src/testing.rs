//! In-memory fakes shared by the unit tests of this crate.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use sourcescout_crawler::{Crawler, FetchOutcome};
use sourcescout_llm::{Completion, CompletionRequest, LanguageModel};
use sourcescout_search::SearchBackend;
use sourcescout_shared::{Chunk, CountTokens, Plan, PlannedStep, RawHit, ResearchError, Result, StepKind};

pub fn plan(steps: &[(StepKind, &str)]) -> Plan {
    Plan {
        objective: "test objective".into(),
        steps: steps
            .iter()
            .map(|(kind, target)| PlannedStep {
                kind: *kind,
                objective: format!("step for {target}"),
                query_or_url: target.to_string(),
            })
            .collect(),
        expected_outcome: String::new(),
    }
}

pub fn chunk(url: &str, content: &str) -> Chunk {
    Chunk {
        url: url.into(),
        title: String::new(),
        snippet: String::new(),
        content: content.into(),
        order: 0,
        relevancy_tier: None,
    }
}

/// `n` space-separated words.
pub fn words(n: usize) -> String {
    vec!["word"; n].join(" ")
}

/// One token per whitespace-separated word.
pub struct WordCounter;

impl CountTokens for WordCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Returns one metadata hit `https://{query}.example/` unless configured otherwise.
#[derive(Default)]
pub struct FakeSearch {
    hits: HashMap<String, Vec<RawHit>>,
    delays: HashMap<String, u64>,
    panics: HashSet<String>,
    scraping: bool,
}

impl FakeSearch {
    pub fn with_hits(mut self, query: &str, hits: Vec<RawHit>) -> Self {
        self.hits.insert(query.into(), hits);
        self
    }

    pub fn with_delay(mut self, query: &str, ms: u64) -> Self {
        self.delays.insert(query.into(), ms);
        self
    }

    pub fn panicking(mut self, query: &str) -> Self {
        self.panics.insert(query.into());
        self
    }

    pub fn requiring_scraping(mut self) -> Self {
        self.scraping = true;
        self
    }
}

#[async_trait]
impl SearchBackend for FakeSearch {
    async fn search(&self, query: &str) -> Vec<RawHit> {
        if let Some(ms) = self.delays.get(query) {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
        if self.panics.contains(query) {
            panic!("search backend exploded on '{query}'");
        }
        self.hits.get(query).cloned().unwrap_or_else(|| {
            vec![RawHit::metadata(
                format!("https://{query}.example/"),
                query,
                format!("snippet for {query}"),
            )]
        })
    }

    fn requires_scraping(&self) -> bool {
        self.scraping
    }

    fn name(&self) -> &str {
        "fake"
    }
}

// ---------------------------------------------------------------------------
// Crawler
// ---------------------------------------------------------------------------

/// Returns `fetched {url}` for every URL except the failing ones.
#[derive(Default)]
pub struct FakeCrawler {
    failing: HashSet<String>,
}

impl FakeCrawler {
    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.into());
        self
    }
}

#[async_trait]
impl Crawler for FakeCrawler {
    async fn fetch(&self, urls: &[String]) -> Vec<FetchOutcome> {
        urls.iter()
            .map(|url| {
                if self.failing.contains(url) {
                    FetchOutcome::failed("HTTP 404 Not Found")
                } else {
                    FetchOutcome::Text(format!("fetched {url}"))
                }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Oracle
// ---------------------------------------------------------------------------

/// Answers classification prompts by looking up the excerpt text.
pub struct FakeOracle {
    answers: HashMap<String, String>,
    fail_first: usize,
    unreachable: bool,
    calls: AtomicUsize,
}

impl FakeOracle {
    pub fn tiers(answers: &[(&str, &str)]) -> Self {
        Self {
            answers: answers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            fail_first: 0,
            unreachable: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::tiers(&[])
        }
    }

    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }
}

#[async_trait]
impl LanguageModel for FakeOracle {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable || call < self.fail_first {
            return Err(ResearchError::Network("connection refused".into()));
        }

        let excerpt = request
            .prompt
            .split_once("Excerpt:\n")
            .and_then(|(_, rest)| rest.split_once("\n\nRelevance"))
            .map(|(excerpt, _)| excerpt.trim())
            .unwrap_or_default();

        let text = self
            .answers
            .get(excerpt)
            .cloned()
            .ok_or_else(|| ResearchError::Oracle(format!("no canned answer for '{excerpt}'")))?;

        Ok(Completion {
            text,
            model: "fake".into(),
            tokens_in: 0,
            tokens_out: 0,
        })
    }

    fn model_name(&self) -> &str {
        "fake"
    }
}

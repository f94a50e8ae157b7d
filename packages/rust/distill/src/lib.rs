//! Content Distiller: raw hits in, token-bounded chunks out.
//!
//! Per page: clean (encoding, boilerplate lines, link targets, whitespace),
//! reduce with the run's [`DistillStrategy`], then split into fixed-size
//! token windows. Pages are processed concurrently under a semaphore and a
//! failure on one page never affects another.

mod cleanup;

use std::sync::Arc;

use regex::Regex;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use sourcescout_llm::{CompletionRequest, LanguageModel};
use sourcescout_shared::{
    Chunk, DistillConfig, DistillStrategy, RawHit, ResearchError, Result, TokenCounter,
};

const SUMMARIZE_SYSTEM: &str = "You condense web pages for a research assistant. \
Keep every fact, figure and claim that bears on the research objective and drop the rest. \
Reply with plain prose only, without preamble.";

/// Upper bound on summary length requested from the oracle.
const SUMMARY_MAX_TOKENS: u32 = 1024;

// ---------------------------------------------------------------------------
// Distiller
// ---------------------------------------------------------------------------

/// Cheap to clone; clones share compiled patterns, the token counter and the
/// concurrency limit.
#[derive(Clone)]
pub struct Distiller {
    inner: Arc<Inner>,
}

struct Inner {
    config: DistillConfig,
    boilerplate: Vec<Regex>,
    counter: TokenCounter,
    oracle: Option<Arc<dyn LanguageModel>>,
    semaphore: Semaphore,
}

impl Distiller {
    /// Compile boilerplate patterns and check the strategy has what it needs.
    pub fn new(
        config: DistillConfig,
        counter: TokenCounter,
        oracle: Option<Arc<dyn LanguageModel>>,
    ) -> Result<Self> {
        if config.chunk_tokens == 0 {
            return Err(ResearchError::config("distill.chunk_tokens must be at least 1"));
        }
        if config.strategy == DistillStrategy::Summarize && oracle.is_none() {
            return Err(ResearchError::config(
                "distill.strategy = \"summarize\" requires a language model",
            ));
        }

        let boilerplate = config
            .boilerplate_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    ResearchError::config(format!("invalid boilerplate pattern '{p}': {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let permits = config.concurrency.max(1);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                boilerplate,
                counter,
                oracle,
                semaphore: Semaphore::new(permits),
            }),
        })
    }

    pub fn strategy(&self) -> DistillStrategy {
        self.inner.config.strategy
    }

    /// Turn every hit into one or more chunks, keeping hit order.
    #[instrument(skip_all, fields(strategy = ?self.strategy(), pages = hits.len()))]
    pub async fn distill(&self, objective: &str, hits: Vec<RawHit>) -> Vec<Chunk> {
        let objective: Arc<str> = Arc::from(objective);
        let mut handles = Vec::with_capacity(hits.len());

        for hit in hits {
            // Kept outside the task so a panicking page still yields its snippet.
            let fallback = Chunk {
                url: hit.url.clone(),
                title: cleanup::clean_inline(&hit.title),
                snippet: cleanup::clean_inline(&hit.snippet),
                content: String::new(),
                order: 0,
                relevancy_tier: None,
            };

            let inner = self.inner.clone();
            let objective = objective.clone();
            handles.push((
                fallback,
                tokio::spawn(async move {
                    let _permit = inner
                        .semaphore
                        .acquire()
                        .await
                        .map_err(|_| ResearchError::Task("distiller semaphore closed".into()))?;
                    inner.distill_page(&objective, hit).await
                }),
            ));
        }

        let mut chunks = Vec::new();
        for (fallback, handle) in handles {
            match handle.await {
                Ok(Ok(page_chunks)) => chunks.extend(page_chunks),
                Ok(Err(e)) => {
                    warn!(url = %fallback.url, error = %e, "distillation failed, keeping snippet only");
                    chunks.push(fallback);
                }
                Err(e) => {
                    warn!(url = %fallback.url, error = %e, "distill task panicked, keeping snippet only");
                    chunks.push(fallback);
                }
            }
        }

        let snippet_only = chunks.iter().filter(|c| c.is_snippet_only()).count();
        info!(chunks = chunks.len(), snippet_only, "distillation complete");
        chunks
    }
}

impl Inner {
    async fn distill_page(&self, objective: &str, hit: RawHit) -> Result<Vec<Chunk>> {
        let cleaned =
            cleanup::run_pipeline(&hit.content, &self.boilerplate, self.config.strip_links);

        let text = match self.config.strategy {
            DistillStrategy::PassThrough => cleaned,
            DistillStrategy::Truncate => {
                self.counter.truncate(&cleaned, self.config.truncate_max_tokens)?
            }
            DistillStrategy::Summarize => self.summarize(objective, &hit.url, &cleaned).await,
        };

        let windows = self.counter.windows(&text, self.config.chunk_tokens)?;
        debug!(url = %hit.url, windows = windows.len(), "page chunked");

        Ok(wrap_windows(&hit, windows))
    }

    /// Oracle summary of `text`. Any failure empties this page only.
    async fn summarize(&self, objective: &str, url: &str, text: &str) -> String {
        let Some(oracle) = &self.oracle else {
            return String::new();
        };
        if text.is_empty() {
            return String::new();
        }

        let input = match self
            .counter
            .truncate(text, self.config.summarize_input_max_tokens)
        {
            Ok(input) => input,
            Err(e) => {
                warn!(%url, error = %e, "could not cap summarizer input");
                return String::new();
            }
        };

        let prompt = format!("Research objective:\n{objective}\n\nSource text:\n{input}");
        let request = CompletionRequest::new(SUMMARIZE_SYSTEM, prompt)
            .max_tokens(SUMMARY_MAX_TOKENS)
            .temperature(0.0);

        match oracle.complete(&request).await {
            Ok(completion) => completion.text.trim().to_string(),
            Err(e) => {
                warn!(%url, model = oracle.model_name(), error = %e, "summarization failed, page content emptied");
                String::new()
            }
        }
    }
}

/// Wrap token windows as chunks; no windows still yields one snippet-only chunk.
fn wrap_windows(hit: &RawHit, windows: Vec<String>) -> Vec<Chunk> {
    let title = cleanup::clean_inline(&hit.title);
    let snippet = cleanup::clean_inline(&hit.snippet);

    let make = |order: usize, content: String| Chunk {
        url: hit.url.clone(),
        title: title.clone(),
        snippet: snippet.clone(),
        content,
        order,
        relevancy_tier: None,
    };

    if windows.is_empty() {
        return vec![make(0, String::new())];
    }

    windows
        .into_iter()
        .enumerate()
        .map(|(order, content)| make(order, content))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sourcescout_llm::Completion;
    use sourcescout_shared::{CountTokens, TokenEncoding};

    struct FakeSummarizer {
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl LanguageModel for FakeSummarizer {
        async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
            if let Some(marker) = self.fail_on {
                if request.prompt.contains(marker) {
                    return Err(ResearchError::Network("connection refused".into()));
                }
            }
            Ok(Completion {
                text: "  Condensed summary.  ".into(),
                model: "fake".into(),
                tokens_in: 0,
                tokens_out: 0,
            })
        }

        fn model_name(&self) -> &str {
            "fake"
        }
    }

    fn counter() -> TokenCounter {
        TokenCounter::new(TokenEncoding::Cl100kBase).unwrap()
    }

    fn config(strategy: DistillStrategy, chunk_tokens: usize) -> DistillConfig {
        DistillConfig {
            strategy,
            chunk_tokens,
            ..DistillConfig::default()
        }
    }

    fn hit(url: &str, content: &str) -> RawHit {
        RawHit {
            url: url.into(),
            title: "Title".into(),
            snippet: "A short snippet.".into(),
            content: content.into(),
        }
    }

    fn long_text() -> String {
        (0..60)
            .map(|i| format!("Sentence number {i} explains how async runtimes schedule tasks."))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[tokio::test]
    async fn short_hit_yields_exactly_one_chunk() {
        let distiller =
            Distiller::new(config(DistillStrategy::PassThrough, 512), counter(), None).unwrap();
        let chunks = distiller
            .distill("obj", vec![hit("https://a.example/", "Tokio is an async runtime.")])
            .await;

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].order, 0);
        assert_eq!(chunks[0].content, "Tokio is an async runtime.");
        assert_eq!(chunks[0].render(), "A short snippet.\n\nTokio is an async runtime.");
    }

    #[tokio::test]
    async fn empty_content_yields_snippet_only_chunk() {
        let distiller =
            Distiller::new(config(DistillStrategy::Truncate, 64), counter(), None).unwrap();
        let chunks = distiller
            .distill("obj", vec![hit("https://a.example/", "Home\n\n  \n")])
            .await;

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_snippet_only());
        assert_eq!(chunks[0].render(), "A short snippet.");
    }

    #[tokio::test]
    async fn windows_reconstruct_strategy_output() {
        let text = long_text();
        let distiller =
            Distiller::new(config(DistillStrategy::PassThrough, 16), counter(), None).unwrap();
        let chunks = distiller.distill("obj", vec![hit("https://a.example/", &text)]).await;

        assert!(chunks.len() > 1);
        let orders: Vec<usize> = chunks.iter().map(|c| c.order).collect();
        assert_eq!(orders, (0..chunks.len()).collect::<Vec<_>>());

        let rebuilt: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rebuilt, text);

        let counter = counter();
        assert!(chunks.iter().all(|c| counter.count(&c.content) <= 16));
    }

    #[tokio::test]
    async fn truncate_caps_page_tokens() {
        let cfg = DistillConfig {
            truncate_max_tokens: 40,
            ..config(DistillStrategy::Truncate, 512)
        };
        let distiller = Distiller::new(cfg, counter(), None).unwrap();
        let chunks = distiller.distill("obj", vec![hit("https://a.example/", &long_text())]).await;

        assert_eq!(chunks.len(), 1);
        assert!(counter().count(&chunks[0].content) <= 40);
        assert!(long_text().starts_with(&chunks[0].content));
    }

    #[tokio::test]
    async fn pages_keep_input_order() {
        let distiller =
            Distiller::new(config(DistillStrategy::PassThrough, 512), counter(), None).unwrap();
        let hits = (0..10)
            .map(|i| hit(&format!("https://a.example/{i}"), &format!("page {i}")))
            .collect();
        let chunks = distiller.distill("obj", hits).await;

        let urls: Vec<String> = chunks.iter().map(|c| c.url.clone()).collect();
        let expected: Vec<String> = (0..10).map(|i| format!("https://a.example/{i}")).collect();
        assert_eq!(urls, expected);
    }

    #[tokio::test]
    async fn summarize_failure_empties_only_that_page() {
        let oracle: Arc<dyn LanguageModel> = Arc::new(FakeSummarizer {
            fail_on: Some("BROKEN"),
        });
        let distiller =
            Distiller::new(config(DistillStrategy::Summarize, 512), counter(), Some(oracle))
                .unwrap();
        let chunks = distiller
            .distill(
                "how do runtimes work",
                vec![
                    hit("https://a.example/ok", "Useful page text."),
                    hit("https://a.example/bad", "BROKEN page text."),
                ],
            )
            .await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "Condensed summary.");
        assert!(chunks[1].is_snippet_only());
        assert_eq!(chunks[1].url, "https://a.example/bad");
    }

    #[test]
    fn summarize_requires_oracle() {
        assert!(Distiller::new(config(DistillStrategy::Summarize, 512), counter(), None).is_err());
    }

    #[test]
    fn invalid_boilerplate_pattern_is_config_error() {
        let cfg = DistillConfig {
            boilerplate_patterns: vec!["(unclosed".into()],
            ..DistillConfig::default()
        };
        let err = Distiller::new(cfg, counter(), None).err().unwrap();
        assert!(matches!(err, ResearchError::Config { .. }));
    }
}

//! Relevancy Sorter: classify chunks into tiers with the oracle, drop tiers
//! outside the allow-list and stable-sort the rest by configured rank.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use sourcescout_llm::{CompletionRequest, LanguageModel};
use sourcescout_shared::{Chunk, RelevancyConfig, RelevancyTier, ResearchError, Result};

const CLASSIFY_SYSTEM: &str = "You grade how useful a source excerpt is for answering a research query. \
Answer with exactly one word: high, medium or low.";

/// Result of one sorting pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SortOutcome {
    pub chunks: Vec<Chunk>,
    /// Classified chunks per tier, before the allow-list filter.
    pub tier_counts: BTreeMap<RelevancyTier, usize>,
    /// Chunks removed because their tier is not considered.
    pub dropped: usize,
    /// Classification failed; `chunks` is the input in original order.
    pub degraded: bool,
}

pub struct RelevancySorter {
    enabled: bool,
    tiers_to_consider: Vec<RelevancyTier>,
    rank: BTreeMap<RelevancyTier, u32>,
    concurrency: usize,
    oracle: Option<Arc<dyn LanguageModel>>,
}

impl RelevancySorter {
    pub fn new(config: &RelevancyConfig, oracle: Option<Arc<dyn LanguageModel>>) -> Result<Self> {
        let rank = config.typed_rank()?;
        if let Some(missing) = config.tiers_to_consider.iter().find(|t| !rank.contains_key(t)) {
            return Err(ResearchError::config(format!(
                "relevancy.tier_rank has no rank for '{missing}'"
            )));
        }
        if config.enabled && oracle.is_none() {
            return Err(ResearchError::config(
                "relevancy sorting is enabled but no language model is configured",
            ));
        }

        Ok(Self {
            enabled: config.enabled,
            tiers_to_consider: config.tiers_to_consider.clone(),
            rank,
            concurrency: config.concurrency.max(1),
            oracle,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Identity when disabled. A classification failure aborts sorting for
    /// the whole run and returns the input unchanged (degraded mode).
    #[instrument(skip_all, fields(chunks = chunks.len(), enabled = self.enabled))]
    pub async fn sort(&self, query: &str, chunks: Vec<Chunk>) -> SortOutcome {
        let oracle = match (&self.oracle, self.enabled) {
            (Some(oracle), true) if !chunks.is_empty() => oracle.clone(),
            _ => {
                return SortOutcome {
                    chunks,
                    ..SortOutcome::default()
                };
            }
        };

        match self.classify_all(oracle, query, &chunks).await {
            Ok(tiers) => self.apply(chunks, tiers),
            Err(e) => {
                if e.is_transport() {
                    warn!(error = %e, "relevancy oracle unreachable, sorting disabled for this run (degraded mode)");
                } else {
                    warn!(error = %e, "chunk could not be classified, sorting disabled for this run (degraded mode)");
                }
                SortOutcome {
                    chunks,
                    degraded: true,
                    ..SortOutcome::default()
                }
            }
        }
    }

    async fn classify_all(
        &self,
        oracle: Arc<dyn LanguageModel>,
        query: &str,
        chunks: &[Chunk],
    ) -> Result<Vec<RelevancyTier>> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let query: Arc<str> = Arc::from(query);

        let mut handles = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let oracle = oracle.clone();
            let sem = semaphore.clone();
            let query = query.clone();
            let (url, order, text) = (chunk.url.clone(), chunk.order, chunk.render());

            handles.push(tokio::spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|_| ResearchError::Task("sorter semaphore closed".into()))?;
                classify_with_retry(oracle.as_ref(), &query, &url, order, &text).await
            }));
        }

        let mut tiers = Vec::with_capacity(handles.len());
        let mut pending = handles.into_iter();
        while let Some(handle) = pending.next() {
            let outcome = handle
                .await
                .map_err(|e| ResearchError::Task(format!("classification of chunk failed to complete: {e}")))
                .and_then(|r| r);
            match outcome {
                Ok(tier) => tiers.push(tier),
                Err(e) => {
                    pending.by_ref().for_each(|h| h.abort());
                    return Err(e);
                }
            }
        }
        Ok(tiers)
    }

    fn apply(&self, chunks: Vec<Chunk>, tiers: Vec<RelevancyTier>) -> SortOutcome {
        let mut tier_counts = BTreeMap::new();
        let mut kept = Vec::with_capacity(chunks.len());
        let mut dropped = 0;

        for (mut chunk, tier) in chunks.into_iter().zip(tiers) {
            *tier_counts.entry(tier).or_insert(0) += 1;
            if self.tiers_to_consider.contains(&tier) {
                chunk.relevancy_tier = Some(tier);
                kept.push(chunk);
            } else {
                debug!(url = %chunk.url, order = chunk.order, %tier, "dropping chunk outside considered tiers");
                dropped += 1;
            }
        }

        // `sort_by_key` is stable: equal ranks keep their relative order.
        kept.sort_by_key(|c| {
            c.relevancy_tier
                .and_then(|t| self.rank.get(&t).copied())
                .unwrap_or(u32::MAX)
        });

        info!(kept = kept.len(), dropped, tiers = ?tier_counts, "relevancy sorting complete");
        SortOutcome {
            chunks: kept,
            tier_counts,
            dropped,
            degraded: false,
        }
    }
}

/// One retry, then a [`ResearchError::Classification`].
async fn classify_with_retry(
    oracle: &dyn LanguageModel,
    query: &str,
    url: &str,
    order: usize,
    text: &str,
) -> Result<RelevancyTier> {
    match classify_once(oracle, query, text).await {
        Ok(tier) => Ok(tier),
        Err(first) => {
            debug!(%url, order, error = %first, "classification failed, retrying once");
            classify_once(oracle, query, text)
                .await
                .map_err(|e| ResearchError::Classification {
                    url: url.to_string(),
                    order,
                    reason: e.to_string(),
                    transport: e.is_transport(),
                })
        }
    }
}

async fn classify_once(oracle: &dyn LanguageModel, query: &str, text: &str) -> Result<RelevancyTier> {
    let prompt = format!("Query:\n{query}\n\nExcerpt:\n{text}\n\nRelevance (high, medium or low):");
    let request = CompletionRequest::new(CLASSIFY_SYSTEM, prompt)
        .max_tokens(4)
        .temperature(0.0);
    let completion = oracle.complete(&request).await?;
    parse_tier(&completion.text)
}

/// Read the first word of the reply as a tier, ignoring punctuation/case.
fn parse_tier(reply: &str) -> Result<RelevancyTier> {
    let word = reply
        .split(|c: char| !c.is_alphabetic())
        .find(|w| !w.is_empty())
        .unwrap_or_default();
    word.parse()
}

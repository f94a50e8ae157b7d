//! End-to-end research pipeline: plan → execute → distill → sort → reduce.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, instrument};

use sourcescout_crawler::Crawler;
use sourcescout_distill::Distiller;
use sourcescout_llm::LanguageModel;
use sourcescout_search::SearchBackend;
use sourcescout_shared::{
    AppConfig, BudgetContext, Chunk, Plan, RelevancyTier, Result, RunId, StepLog, TokenCounter,
};

use crate::citations::CitationRegistry;
use crate::executor::PlanExecutor;
use crate::reducer;
use crate::relevancy::RelevancySorter;

/// What one run hands back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchOutput {
    pub run_id: RunId,
    /// Accepted chunks, in final order.
    pub chunks: Vec<Chunk>,
    /// One entry per executed step, ordered by step index.
    pub step_logs: Vec<StepLog>,
    /// Step count of the submitted plan when it was clamped to `max_steps`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clamped_from: Option<usize>,
    pub tier_counts: BTreeMap<RelevancyTier, usize>,
    pub sorting_degraded: bool,
    /// Source token budget after reserving history.
    pub budget: usize,
    pub tokens_used: usize,
    pub elapsed_ms: u64,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the run completes.
    fn done(&self, output: &ResearchOutput);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _output: &ResearchOutput) {}
}

pub struct ResearchPipeline {
    config: AppConfig,
    executor: PlanExecutor,
    distiller: Distiller,
    sorter: RelevancySorter,
    counter: TokenCounter,
}

impl ResearchPipeline {
    /// Validate the configuration and wire the components. Every
    /// configuration problem surfaces here, before any network call.
    pub fn new(
        config: AppConfig,
        search: Arc<dyn SearchBackend>,
        crawler: Arc<dyn Crawler>,
        oracle: Option<Arc<dyn LanguageModel>>,
    ) -> Result<Self> {
        config.validate()?;

        let counter = TokenCounter::new(config.distill.encoding)?;
        let distiller = Distiller::new(config.distill.clone(), counter.clone(), oracle.clone())?;
        let sorter = RelevancySorter::new(&config.relevancy, oracle)?;
        let executor = PlanExecutor::new(search, crawler, config.research.max_steps);

        Ok(Self {
            config,
            executor,
            distiller,
            sorter,
            counter,
        })
    }

    /// Budget context from the configured window and source fraction.
    pub fn budget_context(&self, history_tokens_used: usize) -> BudgetContext {
        BudgetContext {
            max_input_tokens: self.config.research.max_input_tokens,
            source_fraction: self.config.research.source_fraction,
            history_tokens_used,
        }
    }

    /// Run one research invocation. Only an invalid budget context fails;
    /// every other problem is recovered per unit and shows up in the logs.
    #[instrument(skip_all, fields(run_id = tracing::field::Empty, steps = plan.steps.len()))]
    pub async fn run(
        &self,
        plan: &Plan,
        budget: &BudgetContext,
        citations: &mut CitationRegistry,
        progress: &dyn ProgressReporter,
    ) -> Result<ResearchOutput> {
        budget.validate()?;

        let run_id = RunId::new();
        tracing::Span::current().record("run_id", tracing::field::display(&run_id));
        let start = Instant::now();
        info!(objective = %plan.objective, "starting research run");

        // Phase 1: Execute plan
        progress.phase("Executing plan...");
        let report = self.executor.execute(plan).await;

        // Phase 2: Distill pages
        progress.phase("Distilling pages...");
        let chunks = self.distiller.distill(&plan.objective, report.hits).await;

        // Phase 3: Relevancy
        if self.sorter.is_enabled() {
            progress.phase("Ranking chunks...");
        }
        let sorted = self.sorter.sort(&plan.objective, chunks).await;

        // Phase 4: Token budget
        progress.phase("Applying token budget...");
        let reduced = reducer::reduce(
            sorted.chunks,
            budget,
            &self.counter,
            self.config.research.selection_policy,
        );

        for chunk in &reduced.accepted {
            citations.register(&chunk.url);
        }

        let output = ResearchOutput {
            run_id,
            chunks: reduced.accepted,
            step_logs: report.step_logs,
            clamped_from: report.clamped_from,
            tier_counts: sorted.tier_counts,
            sorting_degraded: sorted.degraded,
            budget: reduced.budget,
            tokens_used: reduced.tokens_used,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            chunks = output.chunks.len(),
            sources = citations.len(),
            tokens_used = output.tokens_used,
            budget = output.budget,
            elapsed_ms = output.elapsed_ms,
            "research run complete"
        );
        progress.done(&output);

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCrawler, FakeOracle, FakeSearch, plan};
    use sourcescout_shared::{DistillStrategy, RawHit, RelevancyConfig, StepKind};

    /// Exactly 50 cl100k tokens.
    fn fifty_tokens(tag: &str) -> String {
        format!("{tag}{}", " a".repeat(49))
    }

    fn hit(url: &str, content: &str) -> RawHit {
        RawHit {
            url: url.into(),
            title: "T".into(),
            snippet: String::new(),
            content: content.into(),
        }
    }

    fn base_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.distill.strategy = DistillStrategy::PassThrough;
        config.research.source_fraction = 1.0;
        config
    }

    fn two_search_pipeline(config: AppConfig, oracle: Option<Arc<dyn LanguageModel>>) -> ResearchPipeline {
        let search = FakeSearch::default()
            .with_hits("q1", vec![hit("https://one.example/", &fifty_tokens("a"))])
            .with_hits("q2", vec![hit("https://two.example/", &fifty_tokens("a"))]);
        ResearchPipeline::new(config, Arc::new(search), Arc::new(FakeCrawler::default()), oracle)
            .unwrap()
    }

    fn two_search_plan() -> Plan {
        plan(&[(StepKind::Search, "q1"), (StepKind::Search, "q2")])
    }

    #[tokio::test]
    async fn both_chunks_fit_budget() {
        let pipeline = two_search_pipeline(base_config(), None);
        let budget = BudgetContext::new(120, 1.0, 0).unwrap();
        let mut citations = CitationRegistry::new();

        let out = pipeline
            .run(&two_search_plan(), &budget, &mut citations, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(out.chunks.len(), 2);
        assert_eq!(out.tokens_used, 100);
        assert_eq!(out.clamped_from, None);
        assert_eq!(citations.number("https://one.example/"), Some(1));
        assert_eq!(citations.number("https://two.example/"), Some(2));
    }

    #[tokio::test]
    async fn oversized_plan_reports_clamp() {
        let mut config = base_config();
        config.research.max_steps = 1;
        let pipeline = two_search_pipeline(config, None);
        let budget = BudgetContext::new(10_000, 1.0, 0).unwrap();
        let mut citations = CitationRegistry::new();

        let out = pipeline
            .run(&two_search_plan(), &budget, &mut citations, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(out.clamped_from, Some(2));
        assert_eq!(out.step_logs.len(), 1);
        assert_eq!(out.chunks.len(), 1);
        assert_eq!(citations.number("https://two.example/"), None);
    }

    #[tokio::test]
    async fn history_leaves_no_room() {
        let pipeline = two_search_pipeline(base_config(), None);
        let budget = BudgetContext::new(120, 1.0, 80).unwrap();
        let mut citations = CitationRegistry::new();

        let out = pipeline
            .run(&two_search_plan(), &budget, &mut citations, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(out.budget, 40);
        assert!(out.chunks.is_empty());
        assert!(citations.is_empty());
    }

    #[tokio::test]
    async fn failed_read_url_yields_empty_output() {
        let crawler = FakeCrawler::default().failing("https://gone.example/");
        let pipeline = ResearchPipeline::new(
            base_config(),
            Arc::new(FakeSearch::default()),
            Arc::new(crawler),
            None,
        )
        .unwrap();
        let budget = BudgetContext::new(10_000, 0.5, 0).unwrap();
        let mut citations = CitationRegistry::new();

        let out = pipeline
            .run(
                &plan(&[(StepKind::ReadUrl, "https://gone.example/")]),
                &budget,
                &mut citations,
                &SilentProgress,
            )
            .await
            .unwrap();

        assert!(out.chunks.is_empty());
        assert_eq!(out.step_logs.len(), 1);
        assert!(out.step_logs[0].is_failed());
    }

    #[tokio::test]
    async fn low_tier_chunk_dropped_despite_budget() {
        let mut config = base_config();
        config.relevancy = RelevancyConfig {
            enabled: true,
            ..RelevancyConfig::default()
        };
        let oracle: Arc<dyn LanguageModel> = Arc::new(FakeOracle::tiers(&[
            ("good source text", "high"),
            ("weak source text", "low"),
        ]));
        let search = FakeSearch::default()
            .with_hits("q1", vec![hit("https://weak.example/", "weak source text")])
            .with_hits("q2", vec![hit("https://good.example/", "good source text")]);
        let pipeline = ResearchPipeline::new(
            config,
            Arc::new(search),
            Arc::new(FakeCrawler::default()),
            Some(oracle),
        )
        .unwrap();
        let budget = BudgetContext::new(10_000, 1.0, 0).unwrap();
        let mut citations = CitationRegistry::new();

        let out = pipeline
            .run(&two_search_plan(), &budget, &mut citations, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(out.chunks.len(), 1);
        assert_eq!(out.chunks[0].url, "https://good.example/");
        assert_eq!(out.tier_counts.get(&RelevancyTier::Low), Some(&1));
        assert!(!out.sorting_degraded);
    }

    #[tokio::test]
    async fn unreachable_oracle_does_not_fail_run() {
        let mut config = base_config();
        config.relevancy.enabled = true;
        let pipeline = two_search_pipeline(config, Some(Arc::new(FakeOracle::unreachable())));
        let budget = BudgetContext::new(10_000, 1.0, 0).unwrap();
        let mut citations = CitationRegistry::new();

        let out = pipeline
            .run(&two_search_plan(), &budget, &mut citations, &SilentProgress)
            .await
            .unwrap();

        assert!(out.sorting_degraded);
        assert_eq!(out.chunks.len(), 2);
        assert_eq!(out.chunks[0].url, "https://one.example/");
    }

    #[test]
    fn invalid_config_fails_before_running() {
        let mut config = base_config();
        config.research.max_steps = 0;
        let result = ResearchPipeline::new(
            config,
            Arc::new(FakeSearch::default()),
            Arc::new(FakeCrawler::default()),
            None,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn invalid_budget_is_rejected() {
        let pipeline = two_search_pipeline(base_config(), None);
        let budget = BudgetContext {
            max_input_tokens: 100,
            source_fraction: 1.5,
            history_tokens_used: 0,
        };
        let mut citations = CitationRegistry::new();
        let result = pipeline
            .run(&two_search_plan(), &budget, &mut citations, &SilentProgress)
            .await;
        assert!(result.is_err());
    }
}

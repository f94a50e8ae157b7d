//! Plan Executor: one concurrent task per step, merged in step order.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use sourcescout_crawler::{Crawler, FetchOutcome};
use sourcescout_search::SearchBackend;
use sourcescout_shared::{
    Plan, RawHit, ResearchError, Result, Step, StepKind, StepLog, StepStatus,
};

/// Hits of every step, concatenated in step order, plus one log per step.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub hits: Vec<RawHit>,
    pub step_logs: Vec<StepLog>,
    /// Step count of the submitted plan when it exceeded `max_steps`.
    pub clamped_from: Option<usize>,
}

impl ExecutionReport {
    pub fn failed_steps(&self) -> usize {
        self.step_logs.iter().filter(|l| l.is_failed()).count()
    }
}

pub struct PlanExecutor {
    search: Arc<dyn SearchBackend>,
    crawler: Arc<dyn Crawler>,
    max_steps: usize,
}

impl PlanExecutor {
    pub fn new(search: Arc<dyn SearchBackend>, crawler: Arc<dyn Crawler>, max_steps: usize) -> Self {
        Self {
            search,
            crawler,
            max_steps,
        }
    }

    /// Accept at most `max_steps` steps, keeping the earliest.
    pub fn accept_steps(&self, plan: &Plan) -> Vec<Step> {
        let original = plan.steps.len();
        let kept = original.min(self.max_steps);
        if kept < original {
            info!(original, kept, max_steps = self.max_steps, "plan clamped");
        }

        plan.steps
            .iter()
            .take(kept)
            .enumerate()
            .map(|(index, planned)| Step::from_planned(index, planned))
            .collect()
    }

    /// Run every accepted step concurrently. A failing step contributes no
    /// hits and a failed log entry; its siblings are unaffected.
    #[instrument(skip_all, fields(steps = plan.steps.len()))]
    pub async fn execute(&self, plan: &Plan) -> ExecutionReport {
        let steps = self.accept_steps(plan);
        let mut handles = Vec::with_capacity(steps.len());

        for step in steps {
            let search = self.search.clone();
            let crawler = self.crawler.clone();
            let started_at = Utc::now();
            let task_step = step.clone();

            let handle = tokio::spawn(async move {
                let clock = Instant::now();
                let result = run_step(search.as_ref(), crawler.as_ref(), &task_step).await;
                (result, clock.elapsed().as_millis() as u64)
            });
            handles.push((step, started_at, handle));
        }

        // Fan-in in step order so logs stay deterministic.
        let mut report = ExecutionReport {
            clamped_from: (plan.steps.len() > self.max_steps).then_some(plan.steps.len()),
            ..ExecutionReport::default()
        };
        for (step, started_at, handle) in handles {
            let (result, elapsed_ms) = match handle.await {
                Ok(done) => done,
                Err(e) => {
                    let reason = if e.is_panic() {
                        format!("step {} panicked", step.index)
                    } else {
                        format!("step {} was cancelled", step.index)
                    };
                    (Err(ResearchError::Task(reason)), elapsed_since(started_at))
                }
            };

            let log = match result {
                Ok(hits) => {
                    debug!(step = step.index, hits = hits.len(), "step succeeded");
                    let log = step_log(&step, StepStatus::Succeeded, hits.len(), None, started_at, elapsed_ms);
                    report.hits.extend(hits);
                    log
                }
                Err(e) => {
                    warn!(step = step.index, kind = %step.kind, error = %e, "step failed");
                    step_log(&step, StepStatus::Failed, 0, Some(e.to_string()), started_at, elapsed_ms)
                }
            };
            report.step_logs.push(log);
        }

        info!(
            hits = report.hits.len(),
            steps = report.step_logs.len(),
            failed = report.failed_steps(),
            "plan execution complete"
        );
        report
    }
}

async fn run_step(search: &dyn SearchBackend, crawler: &dyn Crawler, step: &Step) -> Result<Vec<RawHit>> {
    let target = step.query_or_url.trim();
    if target.is_empty() {
        return Err(ResearchError::validation(format!(
            "step {} has an empty query_or_url",
            step.index
        )));
    }

    match step.kind {
        StepKind::Search => {
            let mut hits = search.search(target).await;
            if search.requires_scraping() && !hits.is_empty() {
                let urls: Vec<String> = hits.iter().map(|h| h.url.clone()).collect();
                let outcomes = crawler.fetch(&urls).await;
                if outcomes.len() != hits.len() {
                    warn!(step = step.index, urls = hits.len(), outcomes = outcomes.len(), "crawler returned a mismatched batch");
                }
                for (hit, outcome) in hits.iter_mut().zip(outcomes) {
                    match outcome {
                        FetchOutcome::Text(text) => hit.content = text,
                        FetchOutcome::Failed { reason } => {
                            debug!(url = %hit.url, %reason, "keeping snippet only");
                        }
                    }
                }
            }
            Ok(hits)
        }
        StepKind::ReadUrl => {
            let outcome = crawler.fetch(&[target.to_string()]).await.into_iter().next();
            match outcome {
                Some(FetchOutcome::Text(text)) => Ok(vec![RawHit::fetched(target, text)]),
                Some(FetchOutcome::Failed { reason }) => {
                    Err(ResearchError::Network(format!("{target}: {reason}")))
                }
                None => Err(ResearchError::Network(format!("{target}: crawler returned nothing"))),
            }
        }
    }
}

fn step_log(
    step: &Step,
    status: StepStatus,
    hits: usize,
    error: Option<String>,
    started_at: DateTime<Utc>,
    elapsed_ms: u64,
) -> StepLog {
    StepLog {
        index: step.index,
        kind: step.kind,
        objective: step.objective.clone(),
        query_or_url: step.query_or_url.clone(),
        status,
        hits,
        error,
        started_at,
        elapsed_ms,
    }
}

fn elapsed_since(started_at: DateTime<Utc>) -> u64 {
    (Utc::now() - started_at).num_milliseconds().max(0) as u64
}

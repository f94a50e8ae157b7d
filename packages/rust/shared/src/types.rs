//! Core domain types for a SourceScout research run.
//!
//! Nothing here is persisted: every value lives for one pipeline invocation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ResearchError, Result};

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline invocation (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Plan / Step
// ---------------------------------------------------------------------------

/// What a plan step does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepKind {
    /// Run a query against the configured search backend.
    Search,
    /// Fetch a single URL with the crawler.
    ReadUrl,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "SEARCH",
            Self::ReadUrl => "READ_URL",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A step as produced by the external planner (no index yet).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedStep {
    pub kind: StepKind,
    /// What this step is meant to find out.
    #[serde(default)]
    pub objective: String,
    /// Search query for `SEARCH`, absolute URL for `READ_URL`.
    pub query_or_url: String,
}

/// The structured research plan handed over by the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Overall research objective.
    pub objective: String,
    pub steps: Vec<PlannedStep>,
    #[serde(default)]
    pub expected_outcome: String,
}

/// A step accepted by the executor. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Position in the (clamped) plan; lower means higher priority.
    pub index: usize,
    pub kind: StepKind,
    pub objective: String,
    pub query_or_url: String,
}

impl Step {
    pub fn from_planned(index: usize, planned: &PlannedStep) -> Self {
        Self {
            index,
            kind: planned.kind,
            objective: planned.objective.clone(),
            query_or_url: planned.query_or_url.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// RawHit
// ---------------------------------------------------------------------------

/// An unprocessed search/crawl result.
///
/// `content` is empty when the backend only supplied metadata and the
/// crawler has not (successfully) filled it in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
    #[serde(default)]
    pub content: String,
}

impl RawHit {
    /// A hit that only carries metadata; content is filled later.
    pub fn metadata(url: impl Into<String>, title: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            snippet: snippet.into(),
            content: String::new(),
        }
    }

    /// A hit synthesized from a directly fetched page.
    pub fn fetched(url: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            snippet: String::new(),
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// RelevancyTier
// ---------------------------------------------------------------------------

/// Coarse usefulness classification of a chunk.
///
/// The derive order is not the sort key; sorting uses the configured rank map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelevancyTier {
    High,
    Medium,
    Low,
}

impl RelevancyTier {
    pub const ALL: [RelevancyTier; 3] = [Self::High, Self::Medium, Self::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for RelevancyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelevancyTier {
    type Err = ResearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(ResearchError::parse(format!("unknown relevancy tier '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// A token-bounded unit of distilled page content plus origin metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// One token window of the page's distilled text (may be empty).
    pub content: String,
    /// Position of this window within its page, starting at 0.
    pub order: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevancy_tier: Option<RelevancyTier>,
}

impl Chunk {
    /// Whether this chunk wraps only the snippet (the page had no content).
    pub fn is_snippet_only(&self) -> bool {
        self.content.is_empty()
    }

    /// Text handed to the downstream model: snippet followed by the window.
    pub fn render(&self) -> String {
        match (self.snippet.is_empty(), self.content.is_empty()) {
            (true, _) => self.content.clone(),
            (false, true) => self.snippet.clone(),
            (false, false) => format!("{}\n\n{}", self.snippet, self.content),
        }
    }
}

// ---------------------------------------------------------------------------
// BudgetContext
// ---------------------------------------------------------------------------

/// Token budget inputs supplied by the history manager.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetContext {
    pub max_input_tokens: usize,
    /// Share of the window reserved for external sources, in `[0, 1]`.
    pub source_fraction: f64,
    #[serde(default)]
    pub history_tokens_used: usize,
}

impl BudgetContext {
    /// Build a validated budget context.
    pub fn new(max_input_tokens: usize, source_fraction: f64, history_tokens_used: usize) -> Result<Self> {
        let ctx = Self {
            max_input_tokens,
            source_fraction,
            history_tokens_used,
        };
        ctx.validate()?;
        Ok(ctx)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.source_fraction) {
            return Err(ResearchError::validation(format!(
                "source_fraction {} not in [0, 1]",
                self.source_fraction
            )));
        }
        Ok(())
    }

    /// `max(0, max_input_tokens * source_fraction - history_tokens_used)`.
    pub fn source_token_budget(&self) -> usize {
        let share = (self.max_input_tokens as f64 * self.source_fraction).floor();
        let remaining = share - self.history_tokens_used as f64;
        if remaining <= 0.0 { 0 } else { remaining as usize }
    }
}

// ---------------------------------------------------------------------------
// StepLog
// ---------------------------------------------------------------------------

/// Outcome of one executed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
}

/// Per-step observability record, ordered by step index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepLog {
    pub index: usize,
    pub kind: StepKind,
    pub objective: String,
    pub query_or_url: String,
    pub status: StepStatus,
    /// Number of hits the step contributed.
    pub hits: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl StepLog {
    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }
}

//! Application configuration for SourceScout.
//!
//! User config lives at `~/.sourcescout/sourcescout.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ResearchError, Result};
use crate::tokens::TokenEncoding;
use crate::types::RelevancyTier;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "sourcescout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".sourcescout";

// ---------------------------------------------------------------------------
// Config structs (matching sourcescout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub research: ResearchConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub crawler: CrawlerConfig,

    #[serde(default)]
    pub distill: DistillConfig,

    #[serde(default)]
    pub relevancy: RelevancyConfig,

    #[serde(default)]
    pub openrouter: OpenRouterConfig,
}

/// `[research]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Plans longer than this are clamped, keeping the earliest steps.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Share of the model window reserved for external sources.
    #[serde(default = "default_source_fraction")]
    pub source_fraction: f64,

    /// Model input window used when the caller does not supply one.
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: usize,

    /// How the reducer treats a chunk that does not fit the remaining budget.
    #[serde(default)]
    pub selection_policy: SelectionPolicy,
}

/// Chunk selection policy of the token-budget reducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Accept in order and stop at the first chunk that does not fit.
    #[default]
    StrictPrefix,
    /// Skip chunks that do not fit and keep trying later, smaller ones.
    BestEffort,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            source_fraction: default_source_fraction(),
            max_input_tokens: default_max_input_tokens(),
            selection_policy: SelectionPolicy::default(),
        }
    }
}

fn default_max_steps() -> usize {
    5
}
fn default_source_fraction() -> f64 {
    0.6
}
fn default_max_input_tokens() -> usize {
    128_000
}

/// Which search backend variant to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchBackendKind {
    /// Classic query API returning metadata only.
    #[default]
    Brave,
    /// Answer-style API returning page content inline.
    Tavily,
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub backend: SearchBackendKind,

    /// Name of the env var holding the backend API key.
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    /// Results requested per query.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,

    /// Override for the backend endpoint (mock servers, proxies).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: SearchBackendKind::default(),
            api_key_env: default_search_key_env(),
            max_results: default_max_results(),
            timeout_secs: default_search_timeout(),
            base_url: None,
        }
    }
}

fn default_search_key_env() -> String {
    "BRAVE_API_KEY".into()
}
fn default_max_results() -> usize {
    5
}
fn default_search_timeout() -> u64 {
    15
}

/// `[crawler]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum concurrent HTTP requests.
    #[serde(default = "default_crawler_concurrency")]
    pub max_concurrency: usize,

    /// Lower bound of the randomized delay before each request.
    #[serde(default = "default_min_delay")]
    pub min_delay_ms: u64,

    /// Upper bound of the randomized delay before each request.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Retries on 429/503 responses.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff step; doubles per retry unless `Retry-After` says otherwise.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Ceiling on any single backoff, including server-sent `Retry-After`.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_crawler_timeout")]
    pub timeout_secs: u64,

    /// Bodies larger than this are cut before extraction.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_crawler_concurrency(),
            min_delay_ms: default_min_delay(),
            max_delay_ms: default_max_delay(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base(),
            max_backoff_ms: default_max_backoff(),
            timeout_secs: default_crawler_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_crawler_concurrency() -> usize {
    4
}
fn default_min_delay() -> u64 {
    100
}
fn default_max_delay() -> u64 {
    600
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    30_000
}
fn default_crawler_timeout() -> u64 {
    30
}
fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

/// How raw page text is reduced before chunking. One strategy per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistillStrategy {
    /// Cleaned text as-is.
    PassThrough,
    /// Hard cut to `truncate_max_tokens`.
    #[default]
    Truncate,
    /// Summarized by the language-model oracle against the objective.
    Summarize,
}

/// `[distill]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistillConfig {
    #[serde(default)]
    pub strategy: DistillStrategy,

    #[serde(default = "default_truncate_max_tokens")]
    pub truncate_max_tokens: usize,

    /// Input cap applied before text is sent to the summarizer.
    #[serde(default = "default_summarize_input_max_tokens")]
    pub summarize_input_max_tokens: usize,

    /// Token window size of each chunk.
    #[serde(default = "default_chunk_tokens")]
    pub chunk_tokens: usize,

    /// Replace `[text](url)` with `text`.
    #[serde(default = "default_true")]
    pub strip_links: bool,

    /// Lines matching any of these regexes are dropped.
    #[serde(default = "default_boilerplate_patterns")]
    pub boilerplate_patterns: Vec<String>,

    /// Pages distilled concurrently.
    #[serde(default = "default_distill_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub encoding: TokenEncoding,
}

impl Default for DistillConfig {
    fn default() -> Self {
        Self {
            strategy: DistillStrategy::default(),
            truncate_max_tokens: default_truncate_max_tokens(),
            summarize_input_max_tokens: default_summarize_input_max_tokens(),
            chunk_tokens: default_chunk_tokens(),
            strip_links: true,
            boilerplate_patterns: default_boilerplate_patterns(),
            concurrency: default_distill_concurrency(),
            encoding: TokenEncoding::default(),
        }
    }
}

fn default_truncate_max_tokens() -> usize {
    2_000
}
fn default_summarize_input_max_tokens() -> usize {
    12_000
}
fn default_chunk_tokens() -> usize {
    512
}
fn default_true() -> bool {
    true
}
fn default_distill_concurrency() -> usize {
    8
}

fn default_boilerplate_patterns() -> Vec<String> {
    [
        r"(?i)^\s*(skip to (main )?content|jump to navigation)\s*$",
        r"(?i)^\s*(home|menu|search|sign in|log in|sign up|subscribe)\s*$",
        r"(?i)^\s*(accept( all)? cookies|we use cookies.*)$",
        r"(?i)^\s*(share|tweet|share on (facebook|twitter|linkedin))\s*$",
        r"(?i)^\s*(©|copyright\b).*$",
        r"(?i)^\s*all rights reserved\.?\s*$",
        r"(?i)^\s*(previous|next)( (page|article|post))?\s*$",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// `[relevancy]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevancyConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Chunks classified into any other tier are dropped.
    #[serde(default = "default_tiers_to_consider")]
    pub tiers_to_consider: Vec<RelevancyTier>,

    /// Chunks classified concurrently.
    #[serde(default = "default_distill_concurrency")]
    pub concurrency: usize,

    /// Sort key per tier name; lower ranks sort first.
    #[serde(default = "default_tier_rank")]
    pub tier_rank: BTreeMap<String, u32>,
}

impl Default for RelevancyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tiers_to_consider: default_tiers_to_consider(),
            concurrency: default_distill_concurrency(),
            tier_rank: default_tier_rank(),
        }
    }
}

fn default_tiers_to_consider() -> Vec<RelevancyTier> {
    vec![RelevancyTier::High, RelevancyTier::Medium]
}

fn default_tier_rank() -> BTreeMap<String, u32> {
    RelevancyTier::ALL
        .iter()
        .enumerate()
        .map(|(rank, tier)| (tier.as_str().to_string(), rank as u32))
        .collect()
}

impl RelevancyConfig {
    /// Parse `tier_rank` into typed keys, rejecting unknown tier names.
    pub fn typed_rank(&self) -> Result<BTreeMap<RelevancyTier, u32>> {
        self.tier_rank
            .iter()
            .map(|(name, rank)| {
                name.parse::<RelevancyTier>()
                    .map(|tier| (tier, *rank))
                    .map_err(|_| ResearchError::config(format!("tier_rank: unknown tier '{name}'")))
            })
            .collect()
    }
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for summarization and relevancy classification.
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_openrouter_base")]
    pub base_url: String,

    #[serde(default = "default_openrouter_timeout")]
    pub timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            base_url: default_openrouter_base(),
            timeout_secs: default_openrouter_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_openrouter_base() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_openrouter_timeout() -> u64 {
    60
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Reject configurations that would fail mid-run. Called before any
    /// network traffic.
    pub fn validate(&self) -> Result<()> {
        if self.research.max_steps == 0 {
            return Err(ResearchError::config("research.max_steps must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.research.source_fraction) {
            return Err(ResearchError::config(format!(
                "research.source_fraction {} not in [0, 1]",
                self.research.source_fraction
            )));
        }
        if self.search.max_results == 0 {
            return Err(ResearchError::config("search.max_results must be at least 1"));
        }
        if self.crawler.max_concurrency == 0 {
            return Err(ResearchError::config("crawler.max_concurrency must be at least 1"));
        }
        if self.crawler.min_delay_ms > self.crawler.max_delay_ms {
            return Err(ResearchError::config(format!(
                "crawler.min_delay_ms ({}) exceeds crawler.max_delay_ms ({})",
                self.crawler.min_delay_ms, self.crawler.max_delay_ms
            )));
        }
        if self.distill.chunk_tokens == 0 {
            return Err(ResearchError::config("distill.chunk_tokens must be at least 1"));
        }
        if self.distill.truncate_max_tokens == 0 || self.distill.summarize_input_max_tokens == 0 {
            return Err(ResearchError::config("distill token caps must be at least 1"));
        }
        if self.distill.concurrency == 0 || self.relevancy.concurrency == 0 {
            return Err(ResearchError::config("distill/relevancy concurrency must be at least 1"));
        }
        for pattern in &self.distill.boilerplate_patterns {
            Regex::new(pattern).map_err(|e| {
                ResearchError::config(format!("distill.boilerplate_patterns: '{pattern}': {e}"))
            })?;
        }

        let rank = self.relevancy.typed_rank()?;
        if let Some(missing) = self
            .relevancy
            .tiers_to_consider
            .iter()
            .find(|tier| !rank.contains_key(tier))
        {
            return Err(ResearchError::config(format!(
                "relevancy.tiers_to_consider contains '{missing}' which has no tier_rank entry"
            )));
        }

        Ok(())
    }

    /// Whether the configured run will call the language-model oracle.
    pub fn needs_oracle(&self) -> bool {
        self.relevancy.enabled || self.distill.strategy == DistillStrategy::Summarize
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.sourcescout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ResearchError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.sourcescout/sourcescout.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ResearchError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ResearchError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ResearchError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ResearchError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ResearchError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the API key env var `var_name` is set and non-empty.
pub fn validate_api_key(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(ResearchError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}

//! Shared types, error model, configuration and token counting for SourceScout.
//!
//! This crate is the foundation depended on by all other SourceScout crates.
//! It provides:
//! - [`ResearchError`]: the unified error type
//! - Domain types ([`Plan`], [`Step`], [`RawHit`], [`Chunk`], [`BudgetContext`], [`StepLog`])
//! - Configuration ([`AppConfig`] and its sections, config loading)
//! - [`TokenCounter`]: the shared token oracle

pub mod config;
pub mod error;
pub mod tokens;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CrawlerConfig, DistillConfig, DistillStrategy, OpenRouterConfig, RelevancyConfig,
    ResearchConfig, SearchBackendKind, SearchConfig, SelectionPolicy, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{ResearchError, Result};
pub use tokens::{CountTokens, TokenCounter, TokenEncoding};
pub use types::{
    BudgetContext, Chunk, Plan, PlannedStep, RawHit, RelevancyTier, RunId, Step, StepKind,
    StepLog, StepStatus,
};

//! Research pipeline orchestration for SourceScout.
//!
//! This crate ties the search backends, crawler and distiller together:
//! - [`executor`]: concurrent plan execution with per-step isolation
//! - [`relevancy`]: optional oracle-driven tiering and reordering
//! - [`reducer`]: token-budget chunk selection
//! - [`citations`]: per-run source numbering
//! - [`pipeline`]: the end-to-end run

pub mod citations;
pub mod executor;
pub mod pipeline;
pub mod reducer;
pub mod relevancy;

#[cfg(test)]
mod testing;

pub use citations::CitationRegistry;
pub use executor::{ExecutionReport, PlanExecutor};
pub use pipeline::{ProgressReporter, ResearchOutput, ResearchPipeline, SilentProgress};
pub use reducer::{ReduceOutcome, reduce};
pub use relevancy::{RelevancySorter, SortOutcome};

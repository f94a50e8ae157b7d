//! Error types for SourceScout.
//!
//! Library crates use [`ResearchError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all SourceScout operations.
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to a search backend, crawler target or oracle.
    #[error("network error: {0}")]
    Network(String),

    /// Response payload or HTML parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Language-model oracle error (non-2xx, empty or unusable completion).
    #[error("oracle error: {0}")]
    Oracle(String),

    /// A chunk could not be classified into a relevancy tier, even after a retry.
    /// `transport` is set when the oracle was never reached.
    #[error("classification failed for {url} (chunk {order}): {reason}")]
    Classification {
        url: String,
        order: usize,
        reason: String,
        transport: bool,
    },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (plan, budget context, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Tokenizer construction or decoding error.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// A spawned worker panicked, was cancelled or lost its semaphore.
    #[error("task failed: {0}")]
    Task(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ResearchError>;

impl ResearchError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the remote side could not be reached at all.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Classification { transport: true, .. }
        )
    }
}

//! Token counting and token-window splitting backed by `tiktoken-rs`.
//!
//! A [`TokenCounter`] is built once per run and shared (cheaply cloned)
//! across every concurrent task; the underlying BPE is immutable.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tiktoken_rs::CoreBPE;

use crate::error::{ResearchError, Result};

/// BPE encodings the counter can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TokenEncoding {
    #[default]
    #[serde(rename = "cl100k_base")]
    Cl100kBase,
    #[serde(rename = "o200k_base")]
    O200kBase,
}

impl fmt::Display for TokenEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cl100kBase => f.write_str("cl100k_base"),
            Self::O200kBase => f.write_str("o200k_base"),
        }
    }
}

/// Anything that can put a token price on a piece of text.
pub trait CountTokens: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Shared tokenizer for a configured encoding.
#[derive(Clone)]
pub struct TokenCounter {
    bpe: Arc<CoreBPE>,
    encoding: TokenEncoding,
}

impl fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCounter")
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl TokenCounter {
    /// Load the BPE ranks for `encoding`.
    pub fn new(encoding: TokenEncoding) -> Result<Self> {
        let bpe = match encoding {
            TokenEncoding::Cl100kBase => tiktoken_rs::cl100k_base(),
            TokenEncoding::O200kBase => tiktoken_rs::o200k_base(),
        }
        .map_err(|e| ResearchError::Tokenizer(format!("failed to load {encoding}: {e}")))?;

        Ok(Self {
            bpe: Arc::new(bpe),
            encoding,
        })
    }

    pub fn encoding(&self) -> TokenEncoding {
        self.encoding
    }

    /// Cut `text` down to at most `max_tokens` tokens.
    pub fn truncate(&self, text: &str, max_tokens: usize) -> Result<String> {
        let tokens = self.bpe.encode_ordinary(text);
        if tokens.len() <= max_tokens {
            return Ok(text.to_string());
        }
        if max_tokens == 0 {
            return Ok(String::new());
        }

        // Back off until the cut lands on a character boundary.
        let mut end = max_tokens;
        loop {
            match self.bpe.decode(tokens[..end].to_vec()) {
                Ok(decoded) => return Ok(decoded),
                Err(_) if end > 1 => end -= 1,
                Err(e) => {
                    return Err(ResearchError::Tokenizer(format!("truncate decode failed: {e}")));
                }
            }
        }
    }

    /// Split `text` into consecutive, non-overlapping windows of at most
    /// `size` tokens.
    ///
    /// Concatenating the returned windows yields `text` exactly. A boundary
    /// that would split a multi-byte character moves left; a single token
    /// that cannot decode alone is merged with its successors.
    pub fn windows(&self, text: &str, size: usize) -> Result<Vec<String>> {
        if size == 0 {
            return Err(ResearchError::validation("token window size must be at least 1"));
        }

        let tokens = self.bpe.encode_ordinary(text);
        let mut windows = Vec::with_capacity(tokens.len().div_ceil(size));
        let mut start = 0;

        while start < tokens.len() {
            let limit = (start + size).min(tokens.len());
            let mut end = limit;

            let decoded = loop {
                match self.bpe.decode(tokens[start..end].to_vec()) {
                    Ok(s) => break s,
                    Err(_) if end > start + 1 && end <= limit => end -= 1,
                    Err(e) => {
                        if end >= tokens.len() {
                            return Err(ResearchError::Tokenizer(format!(
                                "window decode failed at token {start}: {e}"
                            )));
                        }
                        end = end.max(limit) + 1;
                    }
                }
            };

            windows.push(decoded);
            start = end;
        }

        Ok(windows)
    }
}

impl CountTokens for TokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

//! Language-model oracle used for summarization and relevancy classification.
//!
//! - [`LanguageModel`]: the trait every oracle implements
//! - [`OpenRouterClient`]: OpenAI-compatible chat completions over HTTP

mod openrouter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sourcescout_shared::Result;

pub use openrouter::OpenRouterClient;

/// A single prompt sent to the oracle.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Oracle reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// A stateless text-completion oracle, safe to share across tasks.
///
/// Transport failures surface as `ResearchError::Network`; anything the
/// oracle answered but we cannot use surfaces as `ResearchError::Oracle`.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    /// Model identifier, for tracing.
    fn model_name(&self) -> &str;
}

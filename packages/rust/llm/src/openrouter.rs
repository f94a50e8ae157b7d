//! OpenRouter (OpenAI-compatible) chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use sourcescout_shared::{OpenRouterConfig, ResearchError, Result, validate_api_key};

use crate::{Completion, CompletionRequest, LanguageModel};

const USER_AGENT: &str = concat!("SourceScout/", env!("CARGO_PKG_VERSION"));

/// Chat completions client for OpenRouter or any OpenAI-compatible endpoint.
pub struct OpenRouterClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl OpenRouterClient {
    /// Build a client from explicit parts.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ResearchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Build a client from the `[openrouter]` config section, reading the key
    /// from the configured env var.
    pub fn from_config(config: &OpenRouterConfig) -> Result<Self> {
        let api_key = validate_api_key(&config.api_key_env)?;
        Self::new(
            &config.base_url,
            api_key,
            &config.default_model,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl LanguageModel for OpenRouterClient {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ResearchError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(200).collect();
            warn!(%status, body = %snippet, "oracle returned an error status");
            return Err(ResearchError::Oracle(format!("HTTP {status}: {snippet}")));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|e| ResearchError::Oracle(format!("invalid completion payload: {e}")))?;

        let text = payload
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ResearchError::Oracle("completion had no content".into()))?;

        let (tokens_in, tokens_out) = payload
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        debug!(tokens_in, tokens_out, "completion received");

        Ok(Completion {
            text,
            model: payload.model.unwrap_or_else(|| self.model.clone()),
            tokens_in,
            tokens_out,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

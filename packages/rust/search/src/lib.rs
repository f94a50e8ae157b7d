//! Search backends: query string in, ordered raw hits out.
//!
//! Every backend swallows its own failures. Transport errors, error statuses
//! and malformed payloads are logged and produce an empty list; a single
//! malformed result item is dropped without affecting its siblings.

mod brave;
mod tavily;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use url::Url;

use sourcescout_shared::{RawHit, ResearchError, Result, SearchBackendKind, SearchConfig, validate_api_key};

pub use brave::BraveSearch;
pub use tavily::TavilySearch;

/// User-Agent string for search API requests.
const USER_AGENT: &str = concat!("SourceScout/", env!("CARGO_PKG_VERSION"));

/// A web search provider.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run `query`. Never fails: problems yield `[]`.
    async fn search(&self, query: &str) -> Vec<RawHit>;

    /// Whether hits carry only metadata and must be filled by the crawler.
    fn requires_scraping(&self) -> bool;

    /// Backend name for tracing.
    fn name(&self) -> &str;
}

/// Build the configured backend variant, reading its API key from the
/// environment. Fails fast when the key is missing.
pub fn build_backend(config: &SearchConfig) -> Result<Arc<dyn SearchBackend>> {
    let api_key = validate_api_key(&config.api_key_env)?;
    let client = build_client(config.timeout_secs)?;

    let backend: Arc<dyn SearchBackend> = match config.backend {
        SearchBackendKind::Brave => {
            let mut b = BraveSearch::new(client, api_key, config.max_results);
            if let Some(base) = &config.base_url {
                b = b.with_endpoint(base.clone());
            }
            Arc::new(b)
        }
        SearchBackendKind::Tavily => {
            let mut b = TavilySearch::new(client, api_key, config.max_results);
            if let Some(base) = &config.base_url {
                b = b.with_endpoint(base.clone());
            }
            Arc::new(b)
        }
    };

    Ok(backend)
}

pub(crate) fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ResearchError::Network(format!("failed to build HTTP client: {e}")))
}

/// Read a string field, trimmed; missing or non-string yields `""`.
pub(crate) fn str_field<'a>(item: &'a Value, key: &str) -> &'a str {
    item.get(key).and_then(Value::as_str).unwrap_or_default().trim()
}

/// Accept only absolute http(s) URLs.
pub(crate) fn parse_hit_url(raw: &str) -> Result<String> {
    let url = Url::parse(raw).map_err(|e| ResearchError::parse(format!("bad url '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url.to_string()),
        other => Err(ResearchError::parse(format!("unsupported scheme '{other}' in '{raw}'"))),
    }
}

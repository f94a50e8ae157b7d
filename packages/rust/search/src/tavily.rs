//! Tavily search API: answer-style endpoint that returns page text inline.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use sourcescout_shared::{RawHit, ResearchError, Result};

use crate::{SearchBackend, parse_hit_url, str_field};

const DEFAULT_ENDPOINT: &str = "https://api.tavily.com/search";

/// Tavily hits carry `raw_content`, so no crawling is needed.
pub struct TavilySearch {
    client: Client,
    api_key: String,
    endpoint: String,
    max_results: usize,
}

impl TavilySearch {
    pub fn new(client: Client, api_key: impl Into<String>, max_results: usize) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_results,
        }
    }

    /// Point the backend at a different endpoint URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn fetch(&self, query: &str) -> Result<Value> {
        let body = json!({
            "query": query,
            "search_depth": "basic",
            "max_results": self.max_results,
            "include_answer": false,
            "include_raw_content": true
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ResearchError::Network(format!("tavily: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResearchError::Network(format!("tavily: HTTP {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| ResearchError::parse(format!("tavily: invalid payload: {e}")))
    }
}

#[async_trait]
impl SearchBackend for TavilySearch {
    #[instrument(skip(self), fields(backend = "tavily"))]
    async fn search(&self, query: &str) -> Vec<RawHit> {
        match self.fetch(query).await {
            Ok(payload) => {
                let hits = parse_results(&payload);
                debug!(hits = hits.len(), "tavily search complete");
                hits
            }
            Err(e) => {
                warn!(error = %e, "tavily search failed, returning no hits");
                Vec::new()
            }
        }
    }

    fn requires_scraping(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "tavily"
    }
}

fn parse_results(payload: &Value) -> Vec<RawHit> {
    let Some(results) = payload.get("results").and_then(Value::as_array) else {
        debug!("tavily payload has no results array");
        return Vec::new();
    };

    results
        .iter()
        .filter_map(|item| match parse_item(item) {
            Ok(hit) => Some(hit),
            Err(e) => {
                debug!(error = %e, "skipping malformed tavily result");
                None
            }
        })
        .collect()
}

fn parse_item(item: &Value) -> Result<RawHit> {
    let url = parse_hit_url(str_field(item, "url"))?;
    let title = str_field(item, "title");
    let snippet = str_field(item, "content");
    // raw_content is null when Tavily could not extract the page
    let content = str_field(item, "raw_content");

    Ok(RawHit {
        url,
        title: if title.is_empty() { "Untitled".into() } else { title.to_string() },
        snippet: snippet.to_string(),
        content: content.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> TavilySearch {
        let client = crate::build_client(5).unwrap();
        TavilySearch::new(client, "tvly-key", 3).with_endpoint(format!("{}/search", server.uri()))
    }

    #[tokio::test]
    async fn search_returns_inline_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("authorization", "Bearer tvly-key"))
            .and(body_partial_json(serde_json::json!({"query": "bpe tokenizers", "include_raw_content": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {"url": "https://a.example/bpe", "title": "BPE", "content": "short", "raw_content": "Full page text."},
                    {"url": "https://a.example/none", "title": "", "content": "only snippet", "raw_content": null},
                    {"url": "mailto:nobody@example.com", "title": "bad"}
                ]
            })))
            .mount(&server)
            .await;

        let hits = backend(&server).search("bpe tokenizers").await;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "Full page text.");
        assert_eq!(hits[1].title, "Untitled");
        assert!(hits[1].content.is_empty());
    }

    #[tokio::test]
    async fn transport_failure_yields_empty() {
        let client = crate::build_client(2).unwrap();
        let backend = TavilySearch::new(client, "k", 3).with_endpoint("http://127.0.0.1:9/search");
        assert!(backend.search("q").await.is_empty());
    }

    #[test]
    fn does_not_require_scraping() {
        let client = crate::build_client(5).unwrap();
        assert!(!TavilySearch::new(client, "k", 3).requires_scraping());
    }
}

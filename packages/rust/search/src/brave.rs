//! Brave Search web API: classic query endpoint returning metadata only.

use async_trait::async_trait;
use reqwest::Client;
use scraper::Html;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use sourcescout_shared::{RawHit, ResearchError, Result};

use crate::{SearchBackend, parse_hit_url, str_field};

const DEFAULT_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

/// Brave returns titles, URLs and descriptions; page text needs the crawler.
pub struct BraveSearch {
    client: Client,
    api_key: String,
    endpoint: String,
    max_results: usize,
}

impl BraveSearch {
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
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("count", &self.max_results.to_string())])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await
            .map_err(|e| ResearchError::Network(format!("brave: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResearchError::Network(format!("brave: HTTP {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| ResearchError::parse(format!("brave: invalid payload: {e}")))
    }
}

#[async_trait]
impl SearchBackend for BraveSearch {
    #[instrument(skip(self), fields(backend = "brave"))]
    async fn search(&self, query: &str) -> Vec<RawHit> {
        match self.fetch(query).await {
            Ok(payload) => {
                let hits = parse_results(&payload, self.max_results);
                debug!(hits = hits.len(), "brave search complete");
                hits
            }
            Err(e) => {
                warn!(error = %e, "brave search failed, returning no hits");
                Vec::new()
            }
        }
    }

    fn requires_scraping(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "brave"
    }
}

/// Map `web.results[]`, dropping items that fail to parse.
fn parse_results(payload: &Value, max_results: usize) -> Vec<RawHit> {
    let Some(results) = payload
        .get("web")
        .and_then(|w| w.get("results"))
        .and_then(Value::as_array)
    else {
        debug!("brave payload has no web.results");
        return Vec::new();
    };

    results
        .iter()
        .filter_map(|item| match parse_item(item) {
            Ok(hit) => Some(hit),
            Err(e) => {
                debug!(error = %e, "skipping malformed brave result");
                None
            }
        })
        .take(max_results)
        .collect()
}

fn parse_item(item: &Value) -> Result<RawHit> {
    let url = parse_hit_url(str_field(item, "url"))?;
    let title = strip_tags(str_field(item, "title"));
    let snippet = strip_tags(str_field(item, "description"));
    Ok(RawHit::metadata(url, title, snippet))
}

/// Brave highlights matches with inline tags (`<strong>`) and escapes entities.
fn strip_tags(text: &str) -> String {
    Html::parse_fragment(text).root_element().text().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> BraveSearch {
        let client = crate::build_client(5).unwrap();
        BraveSearch::new(client, "brave-key", 5)
            .with_endpoint(format!("{}/res/v1/web/search", server.uri()))
    }

    #[test]
    fn strip_tags_removes_highlighting() {
        assert_eq!(strip_tags("The <strong>tokio</strong> runtime"), "The tokio runtime");
    }

    #[test]
    fn strip_tags_decodes_entities_and_keeps_bare_angle() {
        assert_eq!(
            strip_tags("Rust&#x27;s <strong>async</strong> &amp; tokio, where a < b holds"),
            "Rust's async & tokio, where a < b holds"
        );
    }

    #[test]
    fn malformed_item_is_dropped_alone() {
        let payload = serde_json::json!({
            "web": {"results": [
                {"url": "https://a.example/1", "title": "One", "description": "first"},
                {"title": "No url"},
                {"url": 42, "title": "Numeric url"},
                {"url": "https://a.example/2", "title": "Two", "description": "second"}
            ]}
        });
        let hits = parse_results(&payload, 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://a.example/1");
        assert_eq!(hits[1].snippet, "second");
        assert!(hits.iter().all(|h| h.content.is_empty()));
    }

    #[tokio::test]
    async fn search_maps_web_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/res/v1/web/search"))
            .and(query_param("q", "rust async"))
            .and(header("X-Subscription-Token", "brave-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "web": {"results": [
                    {"url": "https://tokio.rs/", "title": "Tokio", "description": "An <strong>async</strong> runtime"}
                ]}
            })))
            .mount(&server)
            .await;

        let hits = backend(&server).search("rust async").await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Tokio");
        assert_eq!(hits[0].snippet, "An async runtime");
    }

    #[tokio::test]
    async fn error_status_yields_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        assert!(backend(&server).search("anything").await.is_empty());
    }

    #[tokio::test]
    async fn garbage_payload_yields_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        assert!(backend(&server).search("anything").await.is_empty());
    }

    #[test]
    fn requires_scraping() {
        let client = crate::build_client(5).unwrap();
        assert!(BraveSearch::new(client, "k", 3).requires_scraping());
    }
}

//! HTTP crawler engine.
//!
//! Fetches a batch of URLs concurrently under a shared semaphore, sleeping a
//! randomized delay before each request and backing off on 429/503.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

use sourcescout_shared::{CrawlerConfig, ResearchError, Result};

use crate::extract::{html_to_text, looks_like_html};
use crate::{Crawler, FetchOutcome};

/// User-Agent string for crawl requests.
const USER_AGENT: &str = concat!("SourceScout/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// HttpCrawler
// ---------------------------------------------------------------------------

/// Plain-HTTP crawler. The semaphore is shared by every `fetch` call on the
/// same instance, so concurrent plan steps respect one global cap.
pub struct HttpCrawler {
    config: CrawlerConfig,
    client: Client,
    semaphore: Arc<Semaphore>,
    /// Allow localhost/private IPs (for tests against mock servers).
    allow_private_hosts: bool,
}

impl HttpCrawler {
    pub fn new(config: CrawlerConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ResearchError::Network(format!("failed to build HTTP client: {e}")))?;

        let permits = config.max_concurrency.max(1);
        Ok(Self {
            config,
            client,
            semaphore: Arc::new(Semaphore::new(permits)),
            allow_private_hosts: false,
        })
    }

    /// Allow fetching localhost/private IPs.
    pub fn allow_private_hosts(mut self) -> Self {
        self.allow_private_hosts = true;
        self
    }
}

#[async_trait]
impl Crawler for HttpCrawler {
    #[instrument(skip_all, fields(urls = urls.len()))]
    async fn fetch(&self, urls: &[String]) -> Vec<FetchOutcome> {
        let mut handles = Vec::with_capacity(urls.len());

        for raw in urls {
            let url = match Url::parse(raw) {
                Ok(url) => url,
                Err(e) => {
                    handles.push(Err(format!("invalid url: {e}")));
                    continue;
                }
            };

            if !self.allow_private_hosts && is_ssrf_target(&url) {
                warn!(%url, "SSRF protection: blocked");
                handles.push(Err("blocked: private or non-http target".to_string()));
                continue;
            }

            let client = self.client.clone();
            let config = self.config.clone();
            let sem = self.semaphore.clone();

            handles.push(Ok(tokio::spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|_| ResearchError::Network("crawler shut down".into()))?;

                let delay = jitter_delay(config.min_delay_ms, config.max_delay_ms);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }

                fetch_page(&client, &url, &config).await
            })));
        }

        // Await in input order so outcomes line up with `urls`.
        let mut outcomes = Vec::with_capacity(handles.len());
        for (raw, handle) in urls.iter().zip(handles) {
            let outcome = match handle {
                Err(reason) => FetchOutcome::failed(reason),
                Ok(handle) => match handle.await {
                    Ok(Ok(text)) => FetchOutcome::Text(text),
                    Ok(Err(e)) => {
                        warn!(url = %raw, error = %e, "fetch failed");
                        FetchOutcome::failed(e.to_string())
                    }
                    Err(e) => {
                        warn!(url = %raw, error = %e, "fetch task panicked");
                        FetchOutcome::failed(format!("task failed: {e}"))
                    }
                },
            };
            outcomes.push(outcome);
        }

        let failed = outcomes.iter().filter(|o| o.is_failed()).count();
        info!(fetched = outcomes.len() - failed, failed, "fetch batch complete");
        outcomes
    }
}

/// Uniform delay in `[min_ms, max_ms]`.
fn jitter_delay(min_ms: u64, max_ms: u64) -> Duration {
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(v4));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 (unique local)
                || (first & 0xfe00) == 0xfc00
                // fe80::/10 (link local)
                || (first & 0xffc0) == 0xfe80
        }
    }
}

// ---------------------------------------------------------------------------
// Page fetching
// ---------------------------------------------------------------------------

/// Fetch one page, retrying on rate-limit responses, and reduce it to text.
async fn fetch_page(client: &Client, url: &Url, config: &CrawlerConfig) -> Result<String> {
    let mut attempt: u32 = 0;

    let response = loop {
        debug!(%url, attempt, "fetching page");

        let response = client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| ResearchError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if status.is_success() {
            break response;
        }

        let rate_limited =
            status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE;
        if rate_limited && attempt < config.max_retries {
            attempt += 1;
            let delay = backoff_delay(
                response.headers(),
                config.backoff_base_ms,
                config.max_backoff_ms,
                attempt,
            );
            warn!(
                %url,
                %status,
                attempt,
                max_retries = config.max_retries,
                backoff_ms = delay.as_millis() as u64,
                "rate limited, backing off"
            );
            tokio::time::sleep(delay).await;
            continue;
        }

        return Err(ResearchError::Network(format!("{url}: HTTP {status}")));
    };

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_ascii_lowercase);

    let bytes = read_capped(response, config.max_body_bytes).await?;
    let body = String::from_utf8_lossy(&bytes);

    if looks_like_html(content_type.as_deref(), &body) {
        html_to_text(&body)
    } else {
        Ok(body.trim().to_string())
    }
}

/// `Retry-After` seconds when present, otherwise `base * 2^(attempt-1)`.
/// Either way the delay never exceeds `max_ms`.
fn backoff_delay(headers: &HeaderMap, base_ms: u64, max_ms: u64, attempt: u32) -> Duration {
    let retry_after = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    let delay_ms = match retry_after {
        Some(secs) => secs.saturating_mul(1_000),
        None => {
            let shift = attempt.saturating_sub(1).min(16);
            base_ms.saturating_mul(1 << shift)
        }
    };
    Duration::from_millis(delay_ms.min(max_ms))
}

/// Read the body, stopping once `max_bytes` have arrived.
async fn read_capped(mut response: reqwest::Response, max_bytes: usize) -> Result<Vec<u8>> {
    let url = response.url().clone();
    let mut buf = Vec::new();

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| ResearchError::Network(format!("{url}: body read failed: {e}")))?
    {
        let room = max_bytes.saturating_sub(buf.len());
        if chunk.len() >= room {
            buf.extend_from_slice(&chunk[..room]);
            debug!(%url, max_bytes, "body truncated at size cap");
            break;
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(buf)
}

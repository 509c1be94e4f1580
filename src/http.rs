//! Shared HTTP plumbing: wreq client construction, request pacing, and the
//! fetch error type the crawl core branches on.

use crate::config::Config;
use anyhow::{Context, Result};
use rand::Rng;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use wreq::Client;
use wreq_util::Emulation;

/// Why a page could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request failed with status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("blocked by site: {0}")]
    Blocked(String),

    #[error("empty response body")]
    EmptyBody,
}

impl FetchError {
    /// Errors worth retrying: network failures, rate limiting and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status(code) => *code == 429 || *code >= 500,
            FetchError::Transport(_) | FetchError::Blocked(_) => true,
            FetchError::EmptyBody => false,
        }
    }
}

/// Builds a cookie-keeping, compressed, optionally proxied client.
pub fn build_client(config: &Config, timeout: Duration) -> Result<Client> {
    let mut builder = Client::builder()
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10));

    if let Some(proxy_url) = &config.proxy {
        debug!("Configuring proxy: {}", proxy_url);
        let proxy = wreq::Proxy::all(proxy_url).context("Failed to configure proxy")?;
        builder = builder.proxy(proxy);
    }

    builder.build().context("Failed to build HTTP client")
}

/// Performs a browser-emulated GET and returns the body.
pub async fn get_html(client: &Client, url: &str, accept_language: &str) -> Result<String, FetchError> {
    debug!("GET {}", url);

    let response = client
        .get(url)
        .emulation(Emulation::Chrome131)
        .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8")
        .header("Accept-Language", accept_language)
        .header("Cache-Control", "no-cache")
        .header("Pragma", "no-cache")
        .header("Sec-Fetch-Dest", "document")
        .header("Sec-Fetch-Mode", "navigate")
        .header("Sec-Fetch-Site", "none")
        .header("Upgrade-Insecure-Requests", "1")
        .send()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;

    let status = response.status();
    debug!("Response status: {}", status);

    if status.as_u16() == 403 || status.as_u16() == 429 {
        warn!("Blocked or rate limited ({}) at {}", status, url);
    }

    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    let body = response.text().await.map_err(|e| FetchError::Transport(e.to_string()))?;
    if body.trim().is_empty() {
        return Err(FetchError::EmptyBody);
    }

    Ok(body)
}

/// Human-like delay with jitter before each request.
#[derive(Debug, Clone, Copy)]
pub struct RequestPacer {
    delay_ms: u64,
    jitter_ms: u64,
}

impl RequestPacer {
    pub fn new(delay_ms: u64, jitter_ms: u64) -> Self {
        Self { delay_ms, jitter_ms }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.delay_ms, config.delay_jitter_ms)
    }

    pub async fn wait(&self) {
        if self.delay_ms == 0 {
            return;
        }

        let jitter =
            if self.jitter_ms > 0 { rand::rng().random_range(0..=self.jitter_ms) } else { 0 };

        let total_delay = self.delay_ms + jitter;
        debug!("Delaying {}ms", total_delay);
        tokio::time::sleep(Duration::from_millis(total_delay)).await;
    }
}

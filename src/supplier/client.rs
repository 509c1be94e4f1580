//! Page fetcher for supplier storefronts.

use crate::config::Config;
use crate::http::{self, FetchError, RequestPacer};
use crate::retry::{with_retry, ExponentialBackoff};
use crate::supplier::models::{CategoryLink, ProductTile};
use crate::supplier::parser::SupplierParser;
use crate::supplier::selectors::SiteSelectors;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};
use wreq::Client;

/// Trait for supplier page access - enables mocking for tests.
///
/// Ordinary HTTP failures come back as `FetchError`; callers treat any
/// `Ok` body as success.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches a category listing page.
    async fn fetch_category(&self, url: &str) -> Result<String, FetchError>;

    /// Lists the category links reachable from the supplier's start page.
    async fn discover_categories(&self, base_url: &str) -> Result<Vec<CategoryLink>, FetchError>;

    /// Extracts product tiles from a fetched listing page.
    fn extract_product_tiles(&self, html: &str, page_url: &str) -> Vec<ProductTile>;

    /// URL of the next listing page, if any.
    fn next_page_url(&self, _html: &str, _page_url: &str) -> Option<String> {
        None
    }

    /// Fills identifiers (EAN, SKU) missing from the tile. Never fails: on
    /// error the tile is returned unchanged.
    async fn enrich_product(&self, tile: ProductTile) -> ProductTile {
        tile
    }
}

/// HTTP client for supplier sites with browser impersonation and retries.
pub struct SupplierClient {
    client: Client,
    pacer: RequestPacer,
    parser: SupplierParser,
    backoff: ExponentialBackoff,
    attempts: u32,
    accept_language: String,
}

impl SupplierClient {
    /// Creates a new supplier client with the given configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let client = http::build_client(config, Duration::from_secs(30))?;

        Ok(Self {
            client,
            pacer: RequestPacer::from_config(config),
            parser: SupplierParser::new(SiteSelectors::from_config(&config.selectors)),
            backoff: ExponentialBackoff::new(
                config.rate_limit.retry_base_ms,
                config.rate_limit.retry_max_ms,
            ),
            attempts: config.rate_limit.fetch_attempts,
            accept_language: "en-US,en;q=0.9,fr;q=0.8,de;q=0.7".to_string(),
        })
    }

    /// Overrides the Accept-Language header sent to the supplier.
    pub fn with_accept_language(mut self, value: impl Into<String>) -> Self {
        self.accept_language = value.into();
        self
    }

    async fn get(&self, url: &str) -> Result<String, FetchError> {
        with_retry(self.attempts, &self.backoff, url, || async {
            self.pacer.wait().await;
            http::get_html(&self.client, url, &self.accept_language).await
        })
        .await
    }
}

#[async_trait]
impl PageFetcher for SupplierClient {
    async fn fetch_category(&self, url: &str) -> Result<String, FetchError> {
        debug!("Fetching category: {}", url);
        self.get(url).await
    }

    async fn discover_categories(&self, base_url: &str) -> Result<Vec<CategoryLink>, FetchError> {
        info!("Discovering categories on {}", base_url);
        let html = self.get(base_url).await?;
        Ok(self.parser.parse_categories(&html, base_url))
    }

    fn extract_product_tiles(&self, html: &str, page_url: &str) -> Vec<ProductTile> {
        self.parser.parse_product_tiles(html, page_url)
    }

    fn next_page_url(&self, html: &str, page_url: &str) -> Option<String> {
        self.parser.next_page_url(html, page_url)
    }

    async fn enrich_product(&self, mut tile: ProductTile) -> ProductTile {
        if tile.ean.is_some() {
            return tile;
        }

        match self.get(&tile.url).await {
            Ok(html) => {
                let details = self.parser.parse_product_details(&html);
                if tile.ean.is_none() {
                    tile.ean = details.ean;
                }
                if tile.sku.is_none() {
                    tile.sku = details.sku;
                }
            }
            Err(e) => warn!("Could not load product page {}: {}", tile.url, e),
        }
        tile
    }
}

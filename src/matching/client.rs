//! Amazon search-based match engine.

use crate::config::Config;
use crate::http::{self, RequestPacer};
use crate::linking::{is_valid_asin, MatchMethod};
use crate::matching::parser::{parse_search, title_overlap, SearchResult};
use crate::matching::{AmazonMatch, MatchEngine};
use crate::retry::{with_retry, ExponentialBackoff};
use crate::supplier::ProductTile;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};
use wreq::Client;

/// Finds Amazon listings by searching the EAN, then the title.
pub struct AmazonSearchMatcher {
    client: Client,
    pacer: RequestPacer,
    backoff: ExponentialBackoff,
    attempts: u32,
    base_url: String,
    title_threshold: f64,
    candidates: usize,
}

impl AmazonSearchMatcher {
    /// Creates a matcher for the configured marketplace.
    pub fn new(config: &Config) -> Result<Self> {
        let client = http::build_client(config, Duration::from_secs(30))?;

        Ok(Self {
            client,
            pacer: RequestPacer::from_config(config),
            backoff: ExponentialBackoff::new(
                config.rate_limit.retry_base_ms,
                config.rate_limit.retry_max_ms,
            ),
            attempts: config.rate_limit.fetch_attempts,
            base_url: config.matching.amazon_base_url.trim_end_matches('/').to_string(),
            title_threshold: config.matching.title_match_threshold,
            candidates: config.matching.candidates.max(1),
        })
    }

    /// Searches Amazon and returns the organic results with a valid ASIN.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let url = format!("{}/s?k={}", self.base_url, urlencoding::encode(query));
        info!("Searching Amazon: {}", query);

        let html = with_retry(self.attempts, &self.backoff, &url, || async {
            self.pacer.wait().await;
            http::get_html(&self.client, &url, "en-US,en;q=0.9").await
        })
        .await
        .with_context(|| format!("Amazon search failed for {:?}", query))?;

        let results = parse_search(&html, &self.base_url)?;
        Ok(results
            .into_iter()
            .filter(|r| {
                let valid = is_valid_asin(&r.asin);
                if !valid {
                    debug!("Skipping result with invalid ASIN {:?}", r.asin);
                }
                valid
            })
            .take(self.candidates)
            .collect())
    }

    fn best_title_match<'r>(&self, title: &str, results: &'r [SearchResult]) -> Option<&'r SearchResult> {
        results.iter().find(|r| title_overlap(title, &r.title) >= self.title_threshold)
    }
}

#[async_trait]
impl MatchEngine for AmazonSearchMatcher {
    async fn find_match(&self, tile: &ProductTile) -> Result<Option<AmazonMatch>> {
        let ean = tile.ean.as_deref().filter(|e| !e.trim().is_empty());

        if let Some(ean) = ean {
            let results = self.search(ean).await?;
            if let Some(hit) = results.into_iter().next() {
                debug!("EAN {} matched {}", ean, hit.asin);
                return Ok(Some(AmazonMatch::from_result(hit, MatchMethod::EanSearch, Some(ean))));
            }
        }

        if tile.title.trim().is_empty() {
            return Ok(None);
        }

        let results = self.search(&tile.title).await?;
        let method = if ean.is_some() { MatchMethod::HybridSearch } else { MatchMethod::TitleSearch };

        Ok(self
            .best_title_match(&tile.title, &results)
            .cloned()
            .map(|hit| AmazonMatch::from_result(hit, method, None)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_test_config(base_url: &str) -> Config {
        let mut config = Config::default();
        config.delay_ms = 0;
        config.delay_jitter_ms = 0;
        config.rate_limit.fetch_attempts = 2;
        config.rate_limit.retry_base_ms = 1;
        config.rate_limit.retry_max_ms = 5;
        config.matching.amazon_base_url = base_url.to_string();
        config
    }

    fn results_page(cards: &[(&str, &str)]) -> String {
        let cards: String = cards
            .iter()
            .map(|(asin, title)| {
                format!(
                    r#"<div data-component-type="s-search-result" data-asin="{asin}">
                        <h2><a href="/dp/{asin}"><span>{title}</span></a></h2>
                    </div>"#
                )
            })
            .collect();
        format!("<html><body>{}</body></html>", cards)
    }

    async fn matcher(server: &MockServer) -> AmazonSearchMatcher {
        AmazonSearchMatcher::new(&make_test_config(&server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_ean_search_match() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/s"))
            .and(query_param("k", "5012345678900"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(results_page(&[("INVALID123", "Bad"), ("B000000001", "Enamel Mug")])),
            )
            .mount(&server)
            .await;

        let tile = ProductTile::new("https://s.com/p/1", "Enamel Mug").with_ean("5012345678900");
        let found = matcher(&server).await.find_match(&tile).await.unwrap().unwrap();

        assert_eq!(found.asin, "B000000001");
        assert_eq!(found.match_method, MatchMethod::EanSearch);
        assert_eq!(found.ean_on_page.as_deref(), Some("5012345678900"));
        assert_eq!(found.url, format!("{}/dp/B000000001", server.uri()));
    }

    #[tokio::test]
    async fn test_title_search_respects_threshold() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/s"))
            .respond_with(ResponseTemplate::new(200).set_body_string(results_page(&[
                ("B000000001", "Garden Hose 20m"),
                ("B000000002", "Enamel Camping Mug Blue"),
            ])))
            .mount(&server)
            .await;

        let m = matcher(&server).await;

        let tile = ProductTile::new("https://s.com/p/1", "Enamel Camping Mug");
        let found = m.find_match(&tile).await.unwrap().unwrap();
        assert_eq!(found.asin, "B000000002");
        assert_eq!(found.match_method, MatchMethod::TitleSearch);

        let tile = ProductTile::new("https://s.com/p/2", "Cast Iron Skillet");
        assert!(m.find_match(&tile).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_title_fallback_after_empty_ean_search_is_hybrid() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/s"))
            .and(query_param("k", "5012345678900"))
            .respond_with(ResponseTemplate::new(200).set_body_string(results_page(&[])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/s"))
            .and(query_param("k", "Enamel Mug"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(results_page(&[("B000000003", "Enamel Mug")])),
            )
            .mount(&server)
            .await;

        let tile = ProductTile::new("https://s.com/p/1", "Enamel Mug").with_ean("5012345678900");
        let found = matcher(&server).await.find_match(&tile).await.unwrap().unwrap();
        assert_eq!(found.asin, "B000000003");
        assert_eq!(found.match_method, MatchMethod::HybridSearch);
        assert!(found.ean_on_page.is_none());
    }

    #[tokio::test]
    async fn test_captcha_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/s"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body><form action="/errors/validateCaptcha"></form></body></html>"#,
            ))
            .mount(&server)
            .await;

        let tile = ProductTile::new("https://s.com/p/1", "Enamel Mug");
        let err = matcher(&server).await.find_match(&tile).await.unwrap_err();
        assert!(format!("{:#}", err).contains("CAPTCHA"));
    }

    #[tokio::test]
    async fn test_server_error_is_retried_then_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/s"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let tile = ProductTile::new("https://s.com/p/1", "Enamel Mug");
        let err = matcher(&server).await.find_match(&tile).await.unwrap_err();
        assert!(format!("{:#}", err).contains("503"));
    }

    #[tokio::test]
    async fn test_untitled_tile_without_ean_is_skipped() {
        let server = MockServer::start().await;
        let tile = ProductTile::new("https://s.com/p/1", "  ");
        assert!(matcher(&server).await.find_match(&tile).await.unwrap().is_none());
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}

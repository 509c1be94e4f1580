//! Cheap fetch-and-count check run before a category gets crawl budget.

use crate::http::FetchError;
use crate::supplier::PageFetcher;
use crate::urls;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Result of validating one category URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub url: String,
    pub product_count: usize,
    pub is_productive: bool,
    /// Set when the page could not be fetched
    pub error: Option<FetchError>,
}

impl Validation {
    pub fn counted(url: impl Into<String>, product_count: usize, min_products: usize) -> Self {
        Self {
            url: url.into(),
            product_count,
            is_productive: product_count >= min_products,
            error: None,
        }
    }

    pub fn failed(url: impl Into<String>, error: FetchError) -> Self {
        Self { url: url.into(), product_count: 0, is_productive: false, error: Some(error) }
    }

    /// A failure that may succeed on a later cycle.
    pub fn is_transient(&self) -> bool {
        self.error.as_ref().is_some_and(FetchError::is_transient)
    }

    /// Why the category was not productive, for the rejection log.
    pub fn rejection_reason(&self) -> String {
        match &self.error {
            Some(e) => format!("fetch failed: {}", e),
            None => format!("only {} products listed", self.product_count),
        }
    }
}

/// Decides whether a category is worth crawling. Never fails: fetch problems
/// are reported in `Validation::error`.
#[async_trait]
pub trait CategoryValidator: Send + Sync {
    async fn validate(&self, url: &str) -> Validation;
}

/// Fetches the category once and counts product tiles.
pub struct ProductivityValidator<'a> {
    fetcher: &'a dyn PageFetcher,
    min_products: usize,
}

impl<'a> ProductivityValidator<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher, min_products: usize) -> Self {
        Self { fetcher, min_products }
    }
}

#[async_trait]
impl<'a> CategoryValidator for ProductivityValidator<'a> {
    async fn validate(&self, url: &str) -> Validation {
        match self.fetcher.fetch_category(url).await {
            Ok(html) => {
                let count = self.fetcher.extract_product_tiles(&html, url).len();
                debug!("Validated {}: {} products", url, count);
                Validation::counted(url, count, self.min_products)
            }
            Err(e) => {
                warn!("Validation fetch failed for {}: {}", url, e);
                Validation::failed(url, e)
            }
        }
    }
}

/// Memoizes validations for one selection cycle so the deduplicator and the
/// validation stage share fetches.
pub struct CachedValidator<V> {
    inner: V,
    cache: Mutex<HashMap<String, Validation>>,
}

impl<V: CategoryValidator> CachedValidator<V> {
    pub fn new(inner: V) -> Self {
        Self { inner, cache: Mutex::new(HashMap::new()) }
    }

    /// Previously computed validation for the URL, if any.
    pub fn cached(&self, url: &str) -> Option<Validation> {
        self.cache.lock().ok()?.get(&urls::canonical(url)).cloned()
    }
}

#[async_trait]
impl<V: CategoryValidator> CategoryValidator for CachedValidator<V> {
    async fn validate(&self, url: &str) -> Validation {
        if let Some(hit) = self.cached(url) {
            return hit;
        }

        let validation = self.inner.validate(url).await;
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(urls::canonical(url), validation.clone());
        }
        validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supplier::{CategoryLink, ProductTile};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves "N tiles" pages: the body is the tile count, or an error status.
    struct CountingFetcher {
        pages: HashMap<String, Result<usize, FetchError>>,
        fetches: AtomicUsize,
    }

    impl CountingFetcher {
        fn new(pages: &[(&str, Result<usize, FetchError>)]) -> Self {
            Self {
                pages: pages.iter().map(|(u, r)| (u.to_string(), r.clone())).collect(),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for CountingFetcher {
        async fn fetch_category(&self, url: &str) -> Result<String, FetchError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            match self.pages.get(url) {
                Some(Ok(n)) => Ok(n.to_string()),
                Some(Err(e)) => Err(e.clone()),
                None => Err(FetchError::Status(404)),
            }
        }

        async fn discover_categories(&self, _: &str) -> Result<Vec<CategoryLink>, FetchError> {
            Ok(Vec::new())
        }

        fn extract_product_tiles(&self, html: &str, page_url: &str) -> Vec<ProductTile> {
            let n: usize = html.parse().unwrap_or(0);
            (0..n).map(|i| ProductTile::new(format!("{}/p/{}", page_url, i), "item")).collect()
        }
    }

    #[tokio::test]
    async fn test_productive_threshold() {
        let fetcher =
            CountingFetcher::new(&[("https://s.com/a", Ok(2)), ("https://s.com/b", Ok(1))]);
        let validator = ProductivityValidator::new(&fetcher, 2);

        let a = validator.validate("https://s.com/a").await;
        assert!(a.is_productive);
        assert_eq!(a.product_count, 2);

        let b = validator.validate("https://s.com/b").await;
        assert!(!b.is_productive);
        assert!(b.error.is_none());
        assert_eq!(b.rejection_reason(), "only 1 products listed");
    }

    #[tokio::test]
    async fn test_fetch_error_is_unproductive_not_fatal() {
        let fetcher = CountingFetcher::new(&[
            ("https://s.com/down", Err(FetchError::Status(503))),
            ("https://s.com/gone", Err(FetchError::Status(404))),
        ]);
        let validator = ProductivityValidator::new(&fetcher, 2);

        let down = validator.validate("https://s.com/down").await;
        assert_eq!(down.product_count, 0);
        assert!(!down.is_productive);
        assert!(down.is_transient());

        let gone = validator.validate("https://s.com/gone").await;
        assert!(!gone.is_transient());
        assert!(gone.rejection_reason().contains("404"));
    }

    #[tokio::test]
    async fn test_cached_validator_fetches_once() {
        let fetcher = CountingFetcher::new(&[("https://s.com/a", Ok(5))]);
        let validator = CachedValidator::new(ProductivityValidator::new(&fetcher, 2));

        assert!(validator.cached("https://s.com/a").is_none());
        validator.validate("https://s.com/a").await;
        validator.validate("https://s.com/a/").await;

        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(validator.cached("https://s.com/a").map(|v| v.product_count), Some(5));
    }
}

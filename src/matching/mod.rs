//! Matching supplier products to Amazon listings.

pub mod client;
pub mod parser;
pub mod selectors;

pub use client::AmazonSearchMatcher;
pub use parser::{title_overlap, SearchResult};

use crate::linking::MatchMethod;
use crate::supplier::ProductTile;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// An Amazon listing chosen for a supplier product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmazonMatch {
    pub asin: String,
    pub title: String,
    pub url: String,
    pub price: Option<f64>,
    /// EAN confirmed by the search, when the match came from an EAN query
    pub ean_on_page: Option<String>,
    pub match_method: MatchMethod,
}

impl AmazonMatch {
    pub fn from_result(result: SearchResult, match_method: MatchMethod, ean: Option<&str>) -> Self {
        Self {
            asin: result.asin,
            title: result.title,
            url: result.url,
            price: result.price,
            ean_on_page: ean.map(str::to_string),
            match_method,
        }
    }
}

/// Trait for product matching - enables mocking for tests.
///
/// `Ok(None)` means no listing matched; `Err` means the lookup itself failed.
#[async_trait]
pub trait MatchEngine: Send + Sync {
    async fn find_match(&self, tile: &ProductTile) -> Result<Option<AmazonMatch>>;
}

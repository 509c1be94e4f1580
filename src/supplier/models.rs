//! Data models for supplier categories and product tiles.

use serde::{Deserialize, Serialize};

/// A category link found on the supplier's navigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryLink {
    /// Visible link text
    pub name: String,
    /// Absolute category URL
    pub url: String,
}

impl CategoryLink {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self { name: name.into(), url: url.into() }
    }
}

/// A product as listed on a supplier category page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductTile {
    /// Absolute product URL
    pub url: String,
    /// Product title
    pub title: String,
    /// Supplier price, if shown on the tile
    pub price: Option<f64>,
    /// EAN/GTIN barcode if exposed
    pub ean: Option<String>,
    /// Supplier SKU or product id
    pub sku: Option<String>,
    /// Category page the tile was found on
    pub category_url: String,
}

impl ProductTile {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            price: None,
            ean: None,
            sku: None,
            category_url: String::new(),
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_ean(mut self, ean: impl Into<String>) -> Self {
        self.ean = Some(ean.into());
        self
    }
}

/// Identifiers read from a product detail page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductDetails {
    pub ean: Option<String>,
    pub sku: Option<String>,
}

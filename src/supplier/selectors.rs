//! CSS selectors for supplier HTML parsing.
//!
//! Defaults are generic e-commerce selectors covering the common storefront
//! platforms. Sites that need more precision override them in `[selectors]`.

use crate::config::SelectorConfig;
use scraper::Selector;
use std::sync::LazyLock;
use tracing::warn;

/// Product tile containers on a category listing.
pub static PRODUCT_TILE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "li.product, \
         div.product-item, \
         li.product-item, \
         article.product-miniature, \
         div.product-card, \
         div.product-tile, \
         [data-product-id]",
    )
    .unwrap()
});

/// Category navigation links.
pub static CATEGORY_LINK: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "nav a[href], \
         .menu a[href], \
         .category-list a[href], \
         .categories a[href], \
         #top-menu a[href], \
         .navigation a[href]",
    )
    .unwrap()
});

/// Pagination "next" link.
pub static NEXT_PAGE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "a[rel='next'], \
         link[rel='next'], \
         .pagination a.next, \
         .pages-item-next a, \
         li.next a",
    )
    .unwrap()
});

/// Link inside a product tile.
pub static TILE_LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Product title inside a tile.
pub static TILE_TITLE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        ".product-title, \
         .product-name, \
         .product-item-link, \
         .woocommerce-loop-product__title, \
         h2, \
         h3",
    )
    .unwrap()
});

/// Price inside a tile.
pub static TILE_PRICE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "[itemprop='price'], \
         .price-final, \
         .product-price, \
         .price .amount, \
         .price",
    )
    .unwrap()
});

/// Elements carrying barcode/SKU data attributes within a tile.
pub static TILE_DATA: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("[data-ean], [data-gtin], [data-gtin13], [data-sku], [data-product-sku]")
        .unwrap()
});

/// Data attributes holding an EAN/GTIN, in preference order.
pub const EAN_ATTRS: &[&str] = &["data-ean", "data-gtin13", "data-gtin"];

/// Data attributes holding a supplier SKU or id, in preference order.
pub const SKU_ATTRS: &[&str] = &["data-sku", "data-product-sku", "data-product-id"];

/// Selectors for product detail pages.
pub mod product {
    use super::*;

    /// Structured-data barcode fields.
    pub static EAN: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(
            "[itemprop='gtin13'], \
             [itemprop='gtin'], \
             [itemprop='gtin12'], \
             [itemprop='ean'], \
             meta[property='product:ean']",
        )
        .unwrap()
    });

    /// Structured-data SKU.
    pub static SKU: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("[itemprop='sku'], meta[property='product:retailer_item_id']").unwrap());

    /// JSON-LD blocks.
    pub static JSON_LD: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("script[type='application/ld+json']").unwrap());
}

/// Effective selectors for one supplier: overrides where configured, defaults elsewhere.
#[derive(Debug, Clone)]
pub struct SiteSelectors {
    pub product_tile: Selector,
    pub category_link: Selector,
    pub next_page: Selector,
}

impl SiteSelectors {
    pub fn from_config(config: &SelectorConfig) -> Self {
        Self {
            product_tile: parse_or(config.product_tile.as_deref(), &PRODUCT_TILE, "product_tile"),
            category_link: parse_or(
                config.category_link.as_deref(),
                &CATEGORY_LINK,
                "category_link",
            ),
            next_page: parse_or(config.next_page.as_deref(), &NEXT_PAGE, "next_page"),
        }
    }
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self::from_config(&SelectorConfig::default())
    }
}

fn parse_or(custom: Option<&str>, fallback: &Selector, field: &str) -> Selector {
    let Some(custom) = custom else {
        return fallback.clone();
    };

    match Selector::parse(custom) {
        Ok(selector) => selector,
        Err(e) => {
            warn!("Invalid {} selector '{}': {:?}; using default", field, custom, e);
            fallback.clone()
        }
    }
}

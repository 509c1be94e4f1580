//! HTML parser for supplier category navigation, listings, and product pages.

use crate::supplier::models::{CategoryLink, ProductDetails, ProductTile};
use crate::supplier::selectors::{self, product, SiteSelectors, EAN_ATTRS, SKU_ATTRS};
use crate::urls;
use regex_lite::Regex;
use scraper::{ElementRef, Html};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, trace};

/// Path fragments that never lead to a product listing.
const NON_CATEGORY_PATHS: &[&str] = &[
    "login", "account", "compte", "konto", "cart", "panier", "warenkorb", "checkout", "contact",
    "blog", "faq", "help", "aide", "cgv", "terms", "privacy", "legal", "mentions", "about",
    "wishlist", "newsletter", "stores", "magasins",
];

static EAN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:ean|gtin)(?:-?13)?\s*[:#]?\s*(\d{8}|\d{12,14})\b").unwrap()
});

static EAN_JSON_LD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""gtin(?:13|12|8)?"\s*:\s*"(\d{8,14})""#).unwrap());

/// Parser for supplier storefront pages.
#[derive(Debug, Clone, Default)]
pub struct SupplierParser {
    selectors: SiteSelectors,
}

impl SupplierParser {
    pub fn new(selectors: SiteSelectors) -> Self {
        Self { selectors }
    }

    /// Extracts same-host category links from navigation, deduplicated by normalized URL.
    pub fn parse_categories(&self, html: &str, base_url: &str) -> Vec<CategoryLink> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for element in document.select(&self.selectors.category_link) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Some(url) = urls::resolve(base_url, href) else {
                continue;
            };

            if !urls::same_host(&url, base_url) || Self::is_non_category(&url) {
                trace!("Skipping non-category link: {}", url);
                continue;
            }
            if urls::path_depth(&url) == 0 {
                continue;
            }
            if !seen.insert(urls::normalize(&url)) {
                continue;
            }

            let name = element_text(element);
            let name = if name.is_empty() {
                element.value().attr("title").map(str::to_string).unwrap_or_default()
            } else {
                name
            };

            links.push(CategoryLink::new(name, url));
        }

        debug!("Discovered {} category links on {}", links.len(), base_url);
        links
    }

    /// Extracts product tiles from a listing page, deduplicated by product URL.
    pub fn parse_product_tiles(&self, html: &str, page_url: &str) -> Vec<ProductTile> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut tiles = Vec::new();

        for element in document.select(&self.selectors.product_tile) {
            let Some(tile) = self.parse_tile(element, page_url) else {
                trace!("Skipping tile without product link");
                continue;
            };

            if seen.insert(tile.url.clone()) {
                tiles.push(tile);
            }
        }

        debug!("Parsed {} product tiles from {}", tiles.len(), page_url);
        tiles
    }

    /// URL of the next listing page, if the page links one.
    pub fn next_page_url(&self, html: &str, page_url: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let href = document.select(&self.selectors.next_page).next()?.value().attr("href")?;
        let next = urls::resolve(page_url, href)?;

        if urls::canonical(&next) == urls::canonical(page_url) {
            return None;
        }
        Some(next)
    }

    /// Reads EAN and SKU from a product detail page.
    pub fn parse_product_details(&self, html: &str) -> ProductDetails {
        let document = Html::parse_document(html);

        let ean = document
            .select(&product::EAN)
            .map(attr_or_text)
            .find_map(|raw| clean_ean(&raw))
            .or_else(|| {
                document
                    .select(&product::JSON_LD)
                    .map(|e| e.text().collect::<String>())
                    .find_map(|json| EAN_JSON_LD.captures(&json).and_then(|c| clean_ean(&c[1])))
            })
            .or_else(|| {
                let text = document.root_element().text().collect::<Vec<_>>().join(" ");
                EAN_TEXT.captures(&text).and_then(|c| clean_ean(&c[1]))
            });

        let sku = document
            .select(&product::SKU)
            .map(attr_or_text)
            .find(|s| !s.is_empty());

        ProductDetails { ean, sku }
    }

    fn parse_tile(&self, element: ElementRef, page_url: &str) -> Option<ProductTile> {
        let link = element.select(&selectors::TILE_LINK).next()?;
        let url = urls::resolve(page_url, link.value().attr("href")?)?;

        let title = element
            .select(&selectors::TILE_TITLE)
            .map(element_text)
            .find(|t| !t.is_empty())
            .or_else(|| link.value().attr("title").map(|t| t.trim().to_string()))
            .unwrap_or_else(|| element_text(link));

        let price =
            element.select(&selectors::TILE_PRICE).find_map(|e| parse_price(&attr_or_text(e)));

        let ean = first_attr(element, EAN_ATTRS).and_then(|raw| clean_ean(&raw));
        let sku = first_attr(element, SKU_ATTRS);

        Some(ProductTile {
            url,
            title,
            price,
            ean,
            sku,
            category_url: page_url.to_string(),
        })
    }

    fn is_non_category(url: &str) -> bool {
        let (_, path) = urls::host_and_path(url);
        let path = path.to_lowercase();
        path.split(['/', '-', '_', '.'])
            .any(|segment| NON_CATEGORY_PATHS.contains(&segment))
    }
}

/// Reads the first non-empty attribute from the tile or its data-bearing descendants.
fn first_attr(element: ElementRef, attrs: &[&str]) -> Option<String> {
    let candidates = std::iter::once(element).chain(element.select(&selectors::TILE_DATA));
    for candidate in candidates {
        for attr in attrs {
            if let Some(value) = candidate.value().attr(attr) {
                let value = value.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// `content` attribute (meta tags, microdata) or the element's visible text.
fn attr_or_text(element: ElementRef) -> String {
    match element.value().attr("content") {
        Some(content) => content.trim().to_string(),
        None => element_text(element),
    }
}

fn element_text(element: ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keeps digits and accepts EAN-8, UPC-12, EAN-13 and GTIN-14 lengths.
pub fn clean_ean(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        8 | 12 | 13 | 14 => Some(digits),
        _ => None,
    }
}

/// Parses a price in either `1.234,56` or `1,234.56` notation.
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',' || *c == '-')
        .collect();

    // "10-20" ranges: take the lower bound
    let first = cleaned.split('-').find(|part| part.chars().any(|c| c.is_ascii_digit()))?;
    let first = first.trim_matches(|c| c == '.' || c == ',');

    let last_comma = first.rfind(',');
    let last_dot = first.rfind('.');

    let normalized = match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => first.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => first.replace(',', ""),
        (Some(c), None) => {
            // "1,299" is a thousands separator, "12,99" a decimal comma
            if first.len() - c - 1 == 3 && first.len() > 4 {
                first.replace(',', "")
            } else {
                first.replace(',', ".")
            }
        }
        (None, Some(d)) => {
            if first.len() - d - 1 == 3 {
                first.replace('.', "")
            } else {
                first.to_string()
            }
        }
        (None, None) => first.to_string(),
    };

    normalized.parse().ok()
}

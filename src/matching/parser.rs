//! Amazon search result parsing.

use crate::matching::selectors::{errors, search};
use crate::supplier::parser::parse_price;
use anyhow::Result;
use scraper::{ElementRef, Html};
use serde::Serialize;
use tracing::{debug, trace};

/// One organic search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub asin: String,
    pub title: String,
    pub url: String,
    pub price: Option<f64>,
}

/// Parses a search results page. Sponsored cards and cards without an ASIN
/// are skipped. CAPTCHA and error pages are errors.
pub fn parse_search(html: &str, base_url: &str) -> Result<Vec<SearchResult>> {
    let document = Html::parse_document(html);
    check_for_errors(&document)?;

    let results: Vec<SearchResult> = document
        .select(&search::RESULT)
        .filter_map(|card| parse_card(card, base_url))
        .collect();

    debug!("Parsed {} search results", results.len());
    Ok(results)
}

/// Checks for CAPTCHA or Amazon's error page.
fn check_for_errors(document: &Html) -> Result<()> {
    if document.select(&errors::CAPTCHA).next().is_some() {
        anyhow::bail!(
            "CAPTCHA detected. Amazon is blocking requests. \
            Try using a proxy or waiting before retrying."
        );
    }

    if document.select(&errors::DOG_PAGE).next().is_some() {
        anyhow::bail!(
            "Amazon error page detected (503). \
            The service may be temporarily unavailable."
        );
    }

    Ok(())
}

fn parse_card(card: ElementRef, base_url: &str) -> Option<SearchResult> {
    let asin = match card.value().attr(search::ASIN_ATTR) {
        Some(asin) if !asin.trim().is_empty() => asin.trim().to_string(),
        _ => return None,
    };

    if card.select(&search::SPONSORED).next().is_some() {
        trace!("Skipping sponsored result {}", asin);
        return None;
    }

    let title = card
        .select(&search::TITLE)
        .next()
        .map(|e| e.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let url = card
        .select(&search::TITLE_LINK)
        .next()
        .and_then(|e| e.value().attr("href"))
        .map(|href| {
            if href.starts_with("http") {
                href.to_string()
            } else {
                format!("{}{}", base_url.trim_end_matches('/'), href)
            }
        })
        .unwrap_or_else(|| format!("{}/dp/{}", base_url.trim_end_matches('/'), asin));

    let price = card
        .select(&search::PRICE_CURRENT)
        .next()
        .and_then(|e| parse_price(&e.text().collect::<String>()));

    Some(SearchResult { asin, title, url, price })
}

/// Share of the supplier title's tokens found in the Amazon title.
///
/// Tokens are lowercase alphanumeric runs of at least two characters. Returns
/// 0.0 when the supplier title has no tokens.
pub fn title_overlap(supplier_title: &str, amazon_title: &str) -> f64 {
    let tokenize = |s: &str| -> Vec<String> {
        s.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() >= 2)
            .map(str::to_string)
            .collect()
    };

    let mut wanted = tokenize(supplier_title);
    wanted.sort();
    wanted.dedup();
    if wanted.is_empty() {
        return 0.0;
    }

    let found = tokenize(amazon_title);
    let hits = wanted.iter().filter(|t| found.contains(t)).count();
    hits as f64 / wanted.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.amazon.com";

    fn card(asin: &str, title: &str, extra: &str) -> String {
        format!(
            r#"<div data-component-type="s-search-result" data-asin="{asin}">
                <h2><a class="a-link-normal" href="/dp/{asin}"><span>{title}</span></a></h2>
                {extra}
            </div>"#
        )
    }

    #[test]
    fn test_parse_search_results() {
        let html = format!(
            "<html><body>{}{}{}</body></html>",
            card("B000000001", "Enamel Camping Mug", r#"<span class="a-price"><span class="a-offscreen">$12.99</span></span>"#),
            card("", "Placeholder", ""),
            card("B000000002", "Steel Mug", ""),
        );

        let results = parse_search(&html, BASE).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].asin, "B000000001");
        assert_eq!(results[0].title, "Enamel Camping Mug");
        assert_eq!(results[0].url, "https://www.amazon.com/dp/B000000001");
        assert_eq!(results[0].price, Some(12.99));
        assert_eq!(results[1].price, None);
    }

    #[test]
    fn test_sponsored_results_are_skipped() {
        let html = card(
            "B000000001",
            "Ad Mug",
            r#"<span class="puis-label-popover-default">Sponsored</span>"#,
        );
        assert!(parse_search(&html, BASE).unwrap().is_empty());
    }

    #[test]
    fn test_captcha_is_an_error() {
        let html = r#"<html><body><form action="/errors/validateCaptcha">CAPTCHA</form></body></html>"#;
        let err = parse_search(html, BASE).unwrap_err();
        assert!(err.to_string().contains("CAPTCHA"));
    }

    #[test]
    fn test_dog_page_is_an_error() {
        let html = r#"<html><body><img alt="Sorry, the dog ate this page"></body></html>"#;
        let err = parse_search(html, BASE).unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_title_overlap() {
        assert_eq!(title_overlap("Enamel Camping Mug", "Camping Mug, Enamel, Blue"), 1.0);
        assert!((title_overlap("Enamel Camping Mug 350ml", "Steel Camping Mug") - 0.5).abs() < 1e-9);
        assert_eq!(title_overlap("Mug", "Kettle"), 0.0);
        assert_eq!(title_overlap("", "Kettle"), 0.0);
        // Single characters are ignored
        assert_eq!(title_overlap("A Mug", "mug"), 1.0);
    }
}

//! CSS selectors for Amazon search result pages.
//!
//! Update this file when Amazon changes their HTML structure.

use scraper::Selector;
use std::sync::LazyLock;

/// Selectors for search results pages.
pub mod search {
    use super::*;

    /// Product card container - main search result item.
    pub static RESULT: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("[data-component-type='s-search-result']").unwrap());

    /// ASIN attribute on result card.
    pub static ASIN_ATTR: &str = "data-asin";

    /// Product title text.
    pub static TITLE: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(
            "h2 a span, \
             h2 span.a-text-normal, \
             .a-size-medium.a-text-normal, \
             .a-size-base-plus.a-text-normal",
        )
        .unwrap()
    });

    /// Title link for URL extraction.
    pub static TITLE_LINK: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(
            "h2 a.a-link-normal, \
             h2 a.s-link-style, \
             .a-link-normal.s-underline-text, \
             h2 a",
        )
        .unwrap()
    });

    /// Current (non-strikethrough) price.
    pub static PRICE_CURRENT: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(
            ".a-price:not([data-a-strike]) .a-offscreen, \
             .a-price .a-offscreen",
        )
        .unwrap()
    });

    /// Sponsored label.
    pub static SPONSORED: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(
            ".puis-label-popover-default, \
             .s-label-popover-default",
        )
        .unwrap()
    });
}

/// Selectors for detecting error/captcha pages.
pub mod errors {
    use super::*;

    /// CAPTCHA form.
    pub static CAPTCHA: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(
            "form[action*='validateCaptcha'], \
             img[src*='captcha']",
        )
        .unwrap()
    });

    /// Dog page (Amazon's error page).
    pub static DOG_PAGE: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(
            "img[alt*='dog'], \
             .a-box-inner a[href='/ref=cs_503_link']",
        )
        .unwrap()
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_selectors_compile() {
        let _ = &*search::RESULT;
        let _ = &*search::TITLE;
        let _ = &*search::TITLE_LINK;
        let _ = &*search::PRICE_CURRENT;
        let _ = &*search::SPONSORED;
        let _ = &*errors::CAPTCHA;
        let _ = &*errors::DOG_PAGE;
    }

    #[test]
    fn test_result_card_matching() {
        let html = Html::parse_document(
            r#"<div data-component-type="s-search-result" data-asin="B000000001">
                <h2><a class="a-link-normal" href="/dp/B000000001"><span>Enamel Mug</span></a></h2>
            </div>"#,
        );

        let results: Vec<_> = html.select(&search::RESULT).collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].value().attr(search::ASIN_ATTR), Some("B000000001"));
    }
}

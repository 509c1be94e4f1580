//! Listing URL tuning: larger pages, cheapest first.

use std::collections::BTreeMap;
use url::Url;

/// Adds the configured query parameters that the URL does not already carry.
///
/// Existing values win, so a supplier-specific `limit` in the URL is kept.
/// Unparseable URLs are returned unchanged.
pub fn optimize_url(url: &str, params: &BTreeMap<String, String>) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };

    let present: Vec<String> = parsed.query_pairs().map(|(k, _)| k.into_owned()).collect();
    let missing: Vec<(&String, &String)> =
        params.iter().filter(|(key, _)| !present.iter().any(|p| p == *key)).collect();

    if missing.is_empty() {
        return url.to_string();
    }

    parsed.query_pairs_mut().extend_pairs(missing);
    parsed.to_string()
}

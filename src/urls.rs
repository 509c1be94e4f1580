//! URL normalization, hashing, and path helpers shared by the history store
//! and the category deduplicator.

use sha2::{Digest, Sha256};
use url::Url;

/// File extensions stripped from a category path before prefix comparison.
const PAGE_EXTENSIONS: &[&str] = &[".html", ".htm", ".php", ".aspx", ".jsp"];

/// Reduces a URL to scheme + host + path, dropping query, fragment and the
/// trailing slash. Inputs that do not parse as absolute URLs are treated as
/// bare paths.
pub fn normalize(url: &str) -> String {
    let trimmed = url.trim();

    match Url::parse(trimmed) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or_default().to_lowercase();
            let path = parsed.path().trim_end_matches('/');
            format!("{}://{}{}", parsed.scheme(), host, path)
        }
        Err(_) => {
            let path = trimmed.split(['?', '#']).next().unwrap_or_default();
            path.trim_end_matches('/').to_string()
        }
    }
}

/// Canonical form used as the hash-cache key: lowercase host, no fragment,
/// query pairs de-duplicated and sorted, no trailing slash.
pub fn canonical(url: &str) -> String {
    let trimmed = url.trim();

    let Ok(parsed) = Url::parse(trimmed) else {
        return trimmed.split('#').next().unwrap_or_default().trim_end_matches('/').to_string();
    };

    let mut pairs: Vec<(String, String)> =
        parsed.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();
    pairs.sort();
    pairs.dedup_by(|a, b| a.0 == b.0);

    let mut out = normalize(trimmed);
    if !pairs.is_empty() {
        let query: Vec<String> = pairs.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        out.push('?');
        out.push_str(&query.join("&"));
    }
    out
}

/// Stable short hash of the canonical URL.
pub fn url_hash(url: &str) -> String {
    short_hash(&canonical(url), 16)
}

/// Hex-encoded SHA-256 prefix of `input`, `bytes` long before encoding.
pub fn short_hash(input: &str, bytes: usize) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..bytes.min(digest.len())])
}

/// Host (lowercased, `www.` stripped) and path of a URL, or `("", url)` for
/// bare paths.
pub fn host_and_path(url: &str) -> (String, String) {
    let trimmed = url.trim();
    match Url::parse(trimmed) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or_default().to_lowercase();
            let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
            (host, parsed.path().to_string())
        }
        Err(_) => {
            let path = trimmed.split(['?', '#']).next().unwrap_or_default();
            (String::new(), path.to_string())
        }
    }
}

/// Path used for parent/child comparison: no trailing slash, no page extension.
pub fn category_path(url: &str) -> String {
    let (_, path) = host_and_path(url);
    let mut path = path.trim_end_matches('/').to_string();

    for ext in PAGE_EXTENSIONS {
        if path.to_lowercase().ends_with(ext) {
            path.truncate(path.len() - ext.len());
            break;
        }
    }
    path
}

/// Number of non-empty path segments.
pub fn path_depth(url: &str) -> usize {
    category_path(url).split('/').filter(|s| !s.is_empty()).count()
}

/// Resolves `href` against `base`; returns `None` for unusable links.
pub fn resolve(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
    {
        return None;
    }

    let base = Url::parse(base).ok()?;
    let mut joined = base.join(href).ok()?;
    joined.set_fragment(None);

    match joined.scheme() {
        "http" | "https" => Some(joined.to_string()),
        _ => None,
    }
}

/// True when both URLs share a host (ignoring `www.`).
pub fn same_host(a: &str, b: &str) -> bool {
    let (host_a, _) = host_and_path(a);
    let (host_b, _) = host_and_path(b);
    !host_a.is_empty() && host_a == host_b
}

/// Directory-safe key for a supplier given its URL or name.
pub fn supplier_key(supplier: &str) -> String {
    let (host, _) = host_and_path(supplier);
    let source = if host.is_empty() { supplier.trim().to_lowercase() } else { host };

    let key: String = source
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();

    if key.is_empty() {
        "default".to_string()
    } else {
        key
    }
}

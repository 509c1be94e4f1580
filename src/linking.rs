//! Supplier-to-Amazon link records and the buffered linking map writer.
//!
//! The linking map is a JSON array of records. Existing records always win
//! over new ones with the same product identifier.

use crate::storage::{read_json, write_json_atomic};
use crate::urls;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default number of buffered records before an automatic flush.
pub const DEFAULT_BATCH_SIZE: usize = 40;

const SNIPPET_CHARS: usize = 80;

/// How the Amazon listing was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchMethod {
    #[serde(rename = "EAN_search")]
    EanSearch,
    #[serde(rename = "title_search")]
    TitleSearch,
    #[serde(rename = "hybrid_search")]
    HybridSearch,
    #[serde(rename = "manual_match")]
    ManualMatch,
    #[serde(rename = "ai_match")]
    AiMatch,
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchMethod::EanSearch => "EAN_search",
            MatchMethod::TitleSearch => "title_search",
            MatchMethod::HybridSearch => "hybrid_search",
            MatchMethod::ManualMatch => "manual_match",
            MatchMethod::AiMatch => "ai_match",
        };
        write!(f, "{}", s)
    }
}

/// One accepted supplier-product-to-Amazon match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkingRecord {
    pub supplier_product_identifier: String,
    pub supplier_title_snippet: String,
    pub chosen_amazon_asin: String,
    pub amazon_title_snippet: String,
    #[serde(default)]
    pub amazon_ean_on_page: Option<String>,
    pub match_method: MatchMethod,
    #[serde(default)]
    pub supplier_url: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl LinkingRecord {
    /// Builds a record, truncating both titles to snippets.
    pub fn new(
        identifier: impl Into<String>,
        supplier_title: &str,
        asin: impl Into<String>,
        amazon_title: &str,
        match_method: MatchMethod,
    ) -> Self {
        Self {
            supplier_product_identifier: identifier.into(),
            supplier_title_snippet: snippet(supplier_title),
            chosen_amazon_asin: asin.into(),
            amazon_title_snippet: snippet(amazon_title),
            amazon_ean_on_page: None,
            match_method,
            supplier_url: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_supplier_url(mut self, url: impl Into<String>) -> Self {
        self.supplier_url = url.into();
        self
    }

    pub fn with_amazon_ean(mut self, ean: Option<String>) -> Self {
        self.amazon_ean_on_page = ean;
        self
    }

    /// Why this record must not be written, if anything.
    pub fn problem(&self) -> Option<String> {
        if self.supplier_product_identifier.trim().is_empty() {
            return Some("missing supplier product identifier".to_string());
        }
        if !is_valid_asin(&self.chosen_amazon_asin) {
            return Some(format!("invalid ASIN {:?}", self.chosen_amazon_asin));
        }
        None
    }
}

fn snippet(title: &str) -> String {
    title.trim().chars().take(SNIPPET_CHARS).collect()
}

/// Amazon ASIN shape: ten uppercase alphanumerics, a letter followed by a
/// digit (`B0...`). ISBN-style all-digit identifiers are not accepted.
pub fn is_valid_asin(asin: &str) -> bool {
    let bytes = asin.as_bytes();
    bytes.len() == 10
        && bytes.iter().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        && bytes[0].is_ascii_uppercase()
        && bytes[1].is_ascii_digit()
}

/// Stable identifier for a supplier product: EAN, then SKU, then URL hash,
/// then title hash.
pub fn product_identifier(
    ean: Option<&str>,
    sku: Option<&str>,
    url: Option<&str>,
    title: &str,
) -> String {
    let present = |v: Option<&str>| v.map(str::trim).filter(|v| !v.is_empty());

    if let Some(ean) = present(ean) {
        return format!("EAN_{}", ean);
    }
    if let Some(sku) = present(sku) {
        return format!("SKU_{}", sku);
    }
    if let Some(url) = present(url) {
        return format!("URL_{}", urls::short_hash(&urls::canonical(url), 8));
    }
    format!("TITLE_{}", urls::short_hash(&title.trim().to_lowercase(), 8))
}

/// Buffers records and merges them into the on-disk linking map.
#[derive(Debug)]
pub struct LinkingWriter {
    path: PathBuf,
    buffer: Vec<LinkingRecord>,
    batch_size: usize,
    written: usize,
}

impl LinkingWriter {
    pub fn new(path: impl Into<PathBuf>, batch_size: usize) -> Self {
        Self { path: path.into(), buffer: Vec::new(), batch_size: batch_size.max(1), written: 0 }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Records newly written to disk by this writer.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Queues a record. Invalid records are dropped. Returns whether the
    /// record was accepted.
    pub fn add(&mut self, record: LinkingRecord) -> Result<bool> {
        if let Some(problem) = record.problem() {
            warn!("Dropping linking record {}: {}", record.supplier_product_identifier, problem);
            return Ok(false);
        }

        self.buffer.push(record);
        if self.buffer.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(true)
    }

    /// Merges the buffer into the file. A file that cannot be parsed is left
    /// untouched and the buffer is kept.
    pub fn flush(&mut self) -> Result<usize> {
        if self.buffer.is_empty() {
            return Ok(0);
        }

        let mut records: Vec<LinkingRecord> = read_json(&self.path)
            .with_context(|| {
                format!("Refusing to overwrite unreadable linking map {}", self.path.display())
            })?
            .unwrap_or_default();

        let mut known: HashSet<String> =
            records.iter().map(|r| r.supplier_product_identifier.clone()).collect();
        let before = records.len();

        for record in &self.buffer {
            if known.insert(record.supplier_product_identifier.clone()) {
                records.push(record.clone());
            } else {
                debug!(
                    "Keeping existing link for {}",
                    record.supplier_product_identifier
                );
            }
        }

        write_json_atomic(&self.path, &records)?;

        let added = records.len() - before;
        self.written += added;
        self.buffer.clear();
        info!("Linking map: {} new, {} total", added, records.len());
        Ok(added)
    }
}

impl Drop for LinkingWriter {
    fn drop(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        if let Err(e) = self.flush() {
            warn!("Failed to flush {} linking records: {:#}", self.buffer.len(), e);
        }
    }
}

/// Reads the linking map, `None` when it does not exist.
pub fn load(path: &Path) -> Result<Option<Vec<LinkingRecord>>> {
    read_json(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str, asin: &str) -> LinkingRecord {
        LinkingRecord::new(id, "Supplier mug", asin, "Amazon mug", MatchMethod::EanSearch)
    }

    #[test]
    fn test_asin_validation() {
        assert!(is_valid_asin("B012345678"));
        assert!(is_valid_asin("B07XJ8C8F5"));
        assert!(!is_valid_asin("INVALID123"));
        assert!(!is_valid_asin("B0123456789"));
        assert!(!is_valid_asin("B01234567"));
        assert!(!is_valid_asin("1234567890"));
        assert!(!is_valid_asin("b012345678"));
        assert!(!is_valid_asin("B01234567-"));
        assert!(!is_valid_asin(""));
    }

    #[test]
    fn test_product_identifier_fallbacks() {
        assert_eq!(
            product_identifier(Some("5012345678900"), Some("SK1"), None, "Mug"),
            "EAN_5012345678900"
        );
        assert_eq!(product_identifier(Some("  "), Some("SK1"), None, "Mug"), "SKU_SK1");

        let by_url = product_identifier(None, None, Some("https://s.com/p/1"), "Mug");
        assert!(by_url.starts_with("URL_"));
        assert_eq!(by_url.len(), "URL_".len() + 16);
        assert_eq!(by_url, product_identifier(None, None, Some("https://S.com/p/1/"), "Other"));

        let by_title = product_identifier(None, None, None, "Mug");
        assert!(by_title.starts_with("TITLE_"));
        assert_eq!(by_title, product_identifier(None, None, Some(""), " mug "));
    }

    #[test]
    fn test_match_method_names() {
        let json = serde_json::to_string(&MatchMethod::EanSearch).unwrap();
        assert_eq!(json, "\"EAN_search\"");
        let parsed: MatchMethod = serde_json::from_str("\"title_search\"").unwrap();
        assert_eq!(parsed, MatchMethod::TitleSearch);
        assert_eq!(MatchMethod::AiMatch.to_string(), "ai_match");
    }

    #[test]
    fn test_invalid_records_are_dropped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("linking_map.json");
        let mut writer = LinkingWriter::new(&path, DEFAULT_BATCH_SIZE);

        assert!(!writer.add(record("EAN_1", "INVALID123")).unwrap());
        assert!(!writer.add(record(" ", "B012345678")).unwrap());
        assert!(writer.add(record("EAN_2", "B012345678")).unwrap());
        writer.flush().unwrap();

        let stored = load(&path).unwrap().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].supplier_product_identifier, "EAN_2");
    }

    #[test]
    fn test_first_write_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("linking_map.json");

        let mut writer = LinkingWriter::new(&path, DEFAULT_BATCH_SIZE);
        writer.add(record("EAN_1", "B000000001")).unwrap();
        writer.flush().unwrap();

        writer.add(record("EAN_1", "B000000002")).unwrap();
        writer.add(record("EAN_3", "B000000003")).unwrap();
        assert_eq!(writer.flush().unwrap(), 1);

        let stored = load(&path).unwrap().unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].chosen_amazon_asin, "B000000001");
        assert_eq!(stored[1].chosen_amazon_asin, "B000000003");
        assert_eq!(writer.written(), 2);

        // The file is a JSON array
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw.is_array());
    }

    #[test]
    fn test_auto_flush_at_batch_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("linking_map.json");
        let mut writer = LinkingWriter::new(&path, 2);

        writer.add(record("EAN_1", "B000000001")).unwrap();
        assert!(!path.exists());
        writer.add(record("EAN_2", "B000000002")).unwrap();
        assert!(path.exists());
        assert_eq!(writer.pending(), 0);
    }

    #[test]
    fn test_corrupt_file_is_never_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("linking_map.json");
        std::fs::write(&path, "{ not json").unwrap();

        let mut writer = LinkingWriter::new(&path, DEFAULT_BATCH_SIZE);
        writer.add(record("EAN_1", "B000000001")).unwrap();
        assert!(writer.flush().is_err());
        assert_eq!(writer.pending(), 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");

        // An object is not a linking map either
        std::fs::write(&path, "{}").unwrap();
        assert!(writer.flush().is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
        drop(writer);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn test_drop_flushes_pending_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("linking_map.json");
        {
            let mut writer = LinkingWriter::new(&path, DEFAULT_BATCH_SIZE);
            writer.add(record("EAN_1", "B000000001")).unwrap();
        }
        assert_eq!(load(&path).unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_snippets_are_truncated() {
        let long = "x".repeat(200);
        let r = LinkingRecord::new("EAN_1", &long, "B000000001", "short", MatchMethod::TitleSearch);
        assert_eq!(r.supplier_title_snippet.chars().count(), SNIPPET_CHARS);
        assert_eq!(r.amazon_title_snippet, "short");
    }
}

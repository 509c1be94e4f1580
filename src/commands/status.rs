//! Status command: read-only summary of a supplier's persisted files.

use crate::config::Config;
use crate::history::{AiMemoryStore, HistoryStore, PricePhase};
use crate::linking;
use crate::state::{ProcessingState, ProcessingStatus};
use crate::storage::{read_json, SupplierPaths};
use crate::urls;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tracing::warn;

/// Recent errors included in the report.
const RECENT_ERRORS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct HistorySummary {
    pub categories_scraped: usize,
    pub pages_visited: usize,
    pub subpages_scraped: usize,
    pub ai_decisions: usize,
    pub last_scrape: Option<DateTime<Utc>>,
    /// Best categories as (url, products found)
    pub top_categories: Vec<(String, usize)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemorySummary {
    pub price_phase: PricePhase,
    pub total_ai_calls: u64,
    pub suggested_urls: usize,
    pub failed_urls: usize,
    pub total_products_processed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateSummary {
    pub status: ProcessingStatus,
    pub last_processed_index: usize,
    pub total_products: usize,
    pub successful_products: usize,
    pub failed_products: usize,
    pub active_categories: usize,
    pub updated_at: Option<DateTime<Utc>>,
    pub recent_errors: Vec<String>,
}

/// Everything known about one supplier.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub supplier_key: String,
    pub data_dir: PathBuf,
    pub history: HistorySummary,
    pub memory: MemorySummary,
    /// `None` when no processing state has been written yet
    pub state: Option<StateSummary>,
    /// `None` when the linking map is missing or unreadable
    pub linked_products: Option<usize>,
}

/// Reports on a supplier without modifying any file.
pub struct StatusCommand {
    config: Config,
}

impl StatusCommand {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Accepts a supplier URL or the supplier key.
    pub fn execute(&self, supplier: &str) -> Result<StatusReport> {
        let key = urls::supplier_key(supplier);
        let paths = SupplierPaths::new(self.config.resolved_data_dir(), &key);

        let history = HistoryStore::open(paths.history());
        let crawl = history.history();
        let history = HistorySummary {
            categories_scraped: crawl.categories_scraped.len(),
            pages_visited: crawl.pages_visited.len(),
            subpages_scraped: crawl.subpages_scraped.len(),
            ai_decisions: crawl.ai_decision_history.len(),
            last_scrape: crawl.last_scrape_timestamp,
            top_categories: history
                .top_categories(self.config.selection.top_performers)
                .into_iter()
                .map(|(url, perf)| (url, perf.products_found))
                .collect(),
        };

        let memory = AiMemoryStore::open(paths.suggestions());
        let memory = memory.memory();
        let memory = MemorySummary {
            price_phase: memory.price_phase,
            total_ai_calls: memory.total_ai_calls,
            suggested_urls: memory.previously_suggested_urls.len(),
            failed_urls: memory.previously_failed.len(),
            total_products_processed: memory.total_products_processed,
        };

        let state = match read_json::<ProcessingState>(&paths.state()) {
            Ok(state) => state.map(summarize_state),
            Err(e) => {
                warn!("Processing state is unreadable: {:#}", e);
                None
            }
        };

        let linked_products = match linking::load(&paths.linking()) {
            Ok(records) => Some(records.map_or(0, |r| r.len())),
            Err(e) => {
                warn!("Linking map is unreadable: {:#}", e);
                None
            }
        };

        Ok(StatusReport {
            supplier_key: key,
            data_dir: paths.dir().to_path_buf(),
            history,
            memory,
            state,
            linked_products,
        })
    }
}

fn summarize_state(state: ProcessingState) -> StateSummary {
    let skip = state.error_log.len().saturating_sub(RECENT_ERRORS);
    StateSummary {
        status: state.processing_status,
        last_processed_index: state.last_processed_index,
        total_products: state.total_products,
        successful_products: state.successful_products,
        failed_products: state.failed_products,
        active_categories: state.active_categories.len(),
        updated_at: state.updated_at,
        recent_errors: state.error_log.into_iter().skip(skip).map(|e| e.message).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::VisitTier;
    use crate::linking::{LinkingRecord, LinkingWriter, MatchMethod};
    use crate::state::{StateManager, StateOptions};
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.data_dir = Some(dir.path().to_path_buf());
        config
    }

    #[test]
    fn test_status_of_unknown_supplier_is_empty() {
        let dir = TempDir::new().unwrap();
        let report = StatusCommand::new(config(&dir)).execute("https://www.shop.example.com").unwrap();

        assert_eq!(report.supplier_key, "shop.example.com");
        assert_eq!(report.history.categories_scraped, 0);
        assert_eq!(report.memory.price_phase, PricePhase::Low);
        assert!(report.state.is_none());
        assert_eq!(report.linked_products, Some(0));
        // Reading status creates nothing
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_status_reports_persisted_files() {
        let dir = TempDir::new().unwrap();
        let paths = SupplierPaths::new(dir.path(), "shop.example.com");

        let mut history = HistoryStore::open(paths.history());
        history.record_visit("https://shop.example.com/kitchen", VisitTier::Category).unwrap();
        history.record_visit("https://shop.example.com/p/1", VisitTier::Page).unwrap();
        history.record_category_performance("https://shop.example.com/kitchen", 12).unwrap();

        let mut state = StateManager::open(paths.state(), StateOptions::default()).unwrap();
        state
            .start("shop.example.com", "h", serde_json::Value::Null, 20, Vec::new())
            .unwrap();
        state.checkpoint(7, 20).unwrap();
        state.fail("supplier timed out").unwrap();

        let mut writer = LinkingWriter::new(paths.linking(), 40);
        writer
            .add(LinkingRecord::new("EAN_1", "Mug", "B000000001", "Mug", MatchMethod::EanSearch))
            .unwrap();
        writer.flush().unwrap();

        let report = StatusCommand::new(config(&dir)).execute("shop.example.com").unwrap();
        assert_eq!(report.history.categories_scraped, 1);
        assert_eq!(report.history.pages_visited, 1);
        assert_eq!(
            report.history.top_categories,
            vec![("https://shop.example.com/kitchen".to_string(), 12)]
        );

        let state = report.state.unwrap();
        assert_eq!(state.status, ProcessingStatus::Error);
        assert_eq!(state.last_processed_index, 7);
        assert_eq!(state.recent_errors, vec!["supplier timed out".to_string()]);
        assert_eq!(report.linked_products, Some(1));
    }

    #[test]
    fn test_unreadable_linking_map_is_reported_as_unknown() {
        let dir = TempDir::new().unwrap();
        let paths = SupplierPaths::new(dir.path(), "shop.example.com");
        std::fs::create_dir_all(paths.dir()).unwrap();
        std::fs::write(paths.linking(), "{").unwrap();

        let report = StatusCommand::new(config(&dir)).execute("shop.example.com").unwrap();
        assert!(report.linked_products.is_none());
    }
}

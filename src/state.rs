//! Crawl/resume state for one supplier.
//!
//! The state file records how far through the current product list a run got,
//! so an interrupted run resumes at the next product. A state where every
//! processed product failed is treated as poisoned and wiped.

use crate::selection::PlannedCategory;
use crate::storage::{read_json, write_json_atomic};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Error log entries kept; older ones are evicted.
pub const MAX_ERROR_LOG: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    #[default]
    Initialized,
    InProgress,
    Completed,
    Error,
    Paused,
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessingStatus::Initialized => "initialized",
            ProcessingStatus::InProgress => "in_progress",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Error => "error",
            ProcessingStatus::Paused => "paused",
        };
        write!(f, "{}", s)
    }
}

/// Terminal outcome for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Matched,
    NoMatch,
    Skipped,
    Failed,
    Error,
}

impl ProductStatus {
    /// Failed and errored products; everything else counts as a success.
    pub fn is_failure(self) -> bool {
        matches!(self, ProductStatus::Failed | ProductStatus::Error)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    pub status: ProductStatus,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// On-disk processing state document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingState {
    #[serde(default)]
    pub supplier: String,
    #[serde(default)]
    pub last_processed_index: usize,
    #[serde(default)]
    pub total_products: usize,
    #[serde(default)]
    pub processing_status: ProcessingStatus,
    #[serde(default)]
    pub processed_products: BTreeMap<String, ProductRecord>,
    #[serde(default)]
    pub error_log: Vec<ErrorEntry>,
    #[serde(default)]
    pub successful_products: usize,
    #[serde(default)]
    pub failed_products: usize,
    #[serde(default)]
    pub config_hash: String,
    /// Categories being crawled, so a resumed run rebuilds the same product list
    #[serde(default)]
    pub active_categories: Vec<PlannedCategory>,
    #[serde(default)]
    pub settings: serde_json::Value,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub runtime_seconds: Option<f64>,
    pub products_per_hour: Option<f64>,
}

impl ProcessingState {
    /// Every recorded product failed and nothing succeeded.
    pub fn is_poisoned(&self, threshold: usize) -> bool {
        self.processed_products.len() >= threshold.max(1)
            && self.successful_products == 0
            && self.processed_products.values().all(|r| r.status.is_failure())
    }

    fn push_error(&mut self, message: String) {
        self.error_log.push(ErrorEntry { timestamp: Utc::now(), message });
        if self.error_log.len() > MAX_ERROR_LOG {
            let excess = self.error_log.len() - MAX_ERROR_LOG;
            self.error_log.drain(..excess);
        }
    }
}

/// Diagnostics computed when a run completes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunStats {
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub runtime_seconds: f64,
    pub products_per_hour: f64,
}

/// State manager tuning.
#[derive(Debug, Clone, Copy)]
pub struct StateOptions {
    /// `mark_product` persists every N marks
    pub checkpoint_interval: usize,
    /// Minimum all-failed entries before the state counts as poisoned
    pub poison_threshold: usize,
}

impl Default for StateOptions {
    fn default() -> Self {
        Self { checkpoint_interval: 10, poison_threshold: 1 }
    }
}

/// Owns a supplier's processing state file.
#[derive(Debug)]
pub struct StateManager {
    path: PathBuf,
    state: ProcessingState,
    options: StateOptions,
    marks_since_save: usize,
}

impl StateManager {
    /// Loads the state at `path`; a missing or unreadable file starts a fresh
    /// state. A poisoned state is reset on load.
    pub fn open(path: impl Into<PathBuf>, options: StateOptions) -> Result<Self> {
        let path = path.into();

        let state = match read_json::<ProcessingState>(&path) {
            Ok(Some(state)) => state,
            Ok(None) => ProcessingState::default(),
            Err(e) => {
                warn!("Ignoring unreadable processing state ({:#}); starting fresh", e);
                ProcessingState::default()
            }
        };

        let mut manager = Self { path, state, options, marks_since_save: 0 };
        if manager.reset_if_poisoned()? {
            info!("Processing state was poisoned; reset on load");
        }
        Ok(manager)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &ProcessingState {
        &self.state
    }

    /// Begins tracking a new product list.
    pub fn start(
        &mut self,
        supplier: &str,
        config_hash: &str,
        settings: serde_json::Value,
        total_products: usize,
        categories: Vec<PlannedCategory>,
    ) -> Result<()> {
        let now = Utc::now();
        self.state = ProcessingState {
            supplier: supplier.to_string(),
            total_products,
            processing_status: ProcessingStatus::InProgress,
            config_hash: config_hash.to_string(),
            active_categories: categories,
            settings,
            started_at: Some(now),
            updated_at: Some(now),
            error_log: std::mem::take(&mut self.state.error_log),
            ..Default::default()
        };
        self.marks_since_save = 0;

        debug!("Started processing {} products", total_products);
        self.save()
    }

    /// Moves a paused or interrupted state back to in-progress.
    pub fn resume(&mut self, total_products: usize) -> Result<()> {
        self.state.total_products = total_products;
        self.state.processing_status = ProcessingStatus::InProgress;
        self.state.updated_at = Some(Utc::now());
        self.save()
    }

    /// Records progress and persists immediately.
    pub fn checkpoint(&mut self, index: usize, total: usize) -> Result<()> {
        self.state.last_processed_index = index;
        self.state.total_products = total;
        self.state.updated_at = Some(Utc::now());
        self.marks_since_save = 0;
        self.save()
    }

    /// Records a product outcome. Returns true if this made the state
    /// poisoned and it was reset.
    pub fn mark_product(&mut self, url: &str, status: ProductStatus) -> Result<bool> {
        let record = ProductRecord { status, processed_at: Utc::now() };
        let previous = self.state.processed_products.insert(url.to_string(), record);

        if let Some(previous) = previous {
            if previous.status.is_failure() {
                self.state.failed_products = self.state.failed_products.saturating_sub(1);
            } else {
                self.state.successful_products = self.state.successful_products.saturating_sub(1);
            }
        }
        if status.is_failure() {
            self.state.failed_products += 1;
        } else {
            self.state.successful_products += 1;
        }

        if self.reset_if_poisoned()? {
            return Ok(true);
        }

        self.marks_since_save += 1;
        if self.marks_since_save >= self.options.checkpoint_interval.max(1) {
            self.marks_since_save = 0;
            self.state.updated_at = Some(Utc::now());
            self.save()?;
        }
        Ok(false)
    }

    /// Appends to the bounded error log.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.state.push_error(message.into());
    }

    /// Marks the run completed and computes throughput.
    pub fn complete(&mut self) -> Result<RunStats> {
        let now = Utc::now();
        let runtime = self
            .state
            .started_at
            .map(|start| (now - start).num_milliseconds().max(0) as f64 / 1000.0)
            .unwrap_or(0.0);
        let processed = self.state.processed_products.len();
        let per_hour = if runtime > 0.0 { processed as f64 * 3600.0 / runtime } else { 0.0 };

        self.state.processing_status = ProcessingStatus::Completed;
        self.state.last_processed_index =
            self.state.last_processed_index.max(self.state.total_products);
        self.state.completed_at = Some(now);
        self.state.updated_at = Some(now);
        self.state.runtime_seconds = Some(runtime);
        self.state.products_per_hour = Some(per_hour);
        self.save()?;

        Ok(RunStats {
            processed,
            successful: self.state.successful_products,
            failed: self.state.failed_products,
            runtime_seconds: runtime,
            products_per_hour: per_hour,
        })
    }

    pub fn pause(&mut self) -> Result<()> {
        self.state.processing_status = ProcessingStatus::Paused;
        self.state.updated_at = Some(Utc::now());
        self.save()
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.state.push_error(message.into());
        self.state.processing_status = ProcessingStatus::Error;
        self.state.updated_at = Some(Utc::now());
        self.save()
    }

    /// Raw stored index. Callers re-discover when it is past their product list.
    pub fn resume_index(&self) -> usize {
        self.state.last_processed_index
    }

    /// An unfinished run with a product list to go back to.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self.state.processing_status,
            ProcessingStatus::InProgress | ProcessingStatus::Paused | ProcessingStatus::Error
        ) && !self.state.active_categories.is_empty()
    }

    /// Clears progress so the next run starts from scratch.
    pub fn reset(&mut self, note: &str) -> Result<()> {
        let error_log = std::mem::take(&mut self.state.error_log);
        self.state = ProcessingState {
            supplier: std::mem::take(&mut self.state.supplier),
            processing_status: ProcessingStatus::InProgress,
            error_log,
            updated_at: Some(Utc::now()),
            ..Default::default()
        };
        self.state.push_error(note.to_string());
        self.marks_since_save = 0;
        self.save()
    }

    fn reset_if_poisoned(&mut self) -> Result<bool> {
        if !self.state.is_poisoned(self.options.poison_threshold) {
            return Ok(false);
        }

        let failed = self.state.processed_products.len();
        warn!("All {} processed products failed; restarting the batch", failed);
        self.restart_batch(&format!("auto-reset: all {} processed products failed", failed))?;
        Ok(true)
    }

    /// Rewinds the current batch to its first product. The category list is
    /// kept so the next run retries the same products.
    fn restart_batch(&mut self, note: &str) -> Result<()> {
        let state = &mut self.state;
        state.last_processed_index = 0;
        state.processed_products.clear();
        state.successful_products = 0;
        state.failed_products = 0;
        state.processing_status = ProcessingStatus::InProgress;
        state.completed_at = None;
        state.runtime_seconds = None;
        state.products_per_hour = None;
        state.updated_at = Some(Utc::now());
        state.push_error(note.to_string());

        self.marks_since_save = 0;
        self.save()
    }

    pub fn save(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.state)
    }
}

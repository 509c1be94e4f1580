//! Persistent per-supplier crawl history.
//!
//! The history is a memory aid, not a source of truth: an unreadable file is
//! replaced by an empty history and the crawl treats everything as unvisited.

pub mod ai_memory;

pub use ai_memory::{
    AiMemory, AiMemoryStore, EntryKind, PricePhase, RejectedUrl, SuggestionEntry, SuggestionLog,
};

use crate::storage::{read_json, write_json_atomic};
use crate::urls;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Which visited set a URL belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitTier {
    /// Category landing pages
    Category,
    /// Individual product pages
    Page,
    /// Pagination and sub-listing pages of a category
    Subpage,
}

/// Products found the last time a category was crawled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPerformance {
    pub products_found: usize,
    pub last_scraped: DateTime<Utc>,
    pub performance_score: f64,
}

impl CategoryPerformance {
    /// Score is products/10 capped at 1.0.
    pub fn score_for(products_found: usize) -> f64 {
        (products_found as f64 / 10.0).min(1.0)
    }
}

/// One category selection decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiDecision {
    pub timestamp: DateTime<Utc>,
    pub kind: EntryKind,
    #[serde(default)]
    pub categories_suggested: Vec<String>,
    #[serde(default)]
    pub skip_urls: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

/// On-disk crawl history document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlHistory {
    #[serde(default)]
    pub categories_scraped: BTreeSet<String>,
    #[serde(default)]
    pub pages_visited: BTreeSet<String>,
    #[serde(default)]
    pub subpages_scraped: BTreeSet<String>,
    #[serde(default)]
    pub url_hash_cache: BTreeMap<String, String>,
    #[serde(default)]
    pub category_performance: BTreeMap<String, CategoryPerformance>,
    #[serde(default)]
    pub ai_decision_history: Vec<AiDecision>,
    #[serde(default)]
    pub last_scrape_timestamp: Option<DateTime<Utc>>,

    /// Normalized forms of every visited URL; rebuilt on load.
    #[serde(skip)]
    normalized: HashSet<String>,
}

impl CrawlHistory {
    fn rebuild_index(&mut self) {
        self.normalized = self
            .categories_scraped
            .iter()
            .chain(&self.pages_visited)
            .chain(&self.subpages_scraped)
            .map(|url| urls::normalize(url))
            .collect();
    }

    fn tier_mut(&mut self, tier: VisitTier) -> &mut BTreeSet<String> {
        match tier {
            VisitTier::Category => &mut self.categories_scraped,
            VisitTier::Page => &mut self.pages_visited,
            VisitTier::Subpage => &mut self.subpages_scraped,
        }
    }

    /// Adds a URL to a tier and the hash cache. Returns true if anything changed.
    fn insert(&mut self, url: &str, tier: VisitTier) -> bool {
        let added = self.tier_mut(tier).insert(url.to_string());
        let hashed = self.url_hash_cache.insert(urls::url_hash(url), url.to_string()).is_none();
        self.normalized.insert(urls::normalize(url));
        added || hashed
    }

    /// True if the URL, its canonical hash, or its normalized path was seen in any tier.
    pub fn is_previously_visited(&self, url: &str) -> bool {
        if self.categories_scraped.contains(url)
            || self.pages_visited.contains(url)
            || self.subpages_scraped.contains(url)
        {
            return true;
        }

        if self.url_hash_cache.contains_key(&urls::url_hash(url)) {
            return true;
        }

        self.normalized.contains(&urls::normalize(url))
    }

    pub fn visited_count(&self) -> usize {
        self.categories_scraped.len() + self.pages_visited.len() + self.subpages_scraped.len()
    }
}

/// Owns a supplier's history file and persists after every mutation.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    history: CrawlHistory,
}

impl HistoryStore {
    /// Loads the history at `path`, or starts empty if it is missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let mut history = match read_json::<CrawlHistory>(&path) {
            Ok(Some(history)) => {
                debug!("Loaded crawl history from {}", path.display());
                history
            }
            Ok(None) => {
                debug!("No crawl history at {}, starting fresh", path.display());
                CrawlHistory::default()
            }
            Err(e) => {
                warn!("Ignoring unreadable crawl history ({:#}); starting fresh", e);
                CrawlHistory::default()
            }
        };
        history.rebuild_index();

        Self { path, history }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn history(&self) -> &CrawlHistory {
        &self.history
    }

    pub fn is_previously_visited(&self, url: &str) -> bool {
        self.history.is_previously_visited(url)
    }

    /// Records a visit. Idempotent; persists only when something changed.
    pub fn record_visit(&mut self, url: &str, tier: VisitTier) -> Result<()> {
        self.record_visits(std::iter::once(url), tier)
    }

    /// Records a batch of visits with a single write.
    pub fn record_visits<'a, I>(&mut self, urls: I, tier: VisitTier) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut changed = false;
        for url in urls {
            changed |= self.history.insert(url, tier);
        }

        if changed {
            self.history.last_scrape_timestamp = Some(Utc::now());
            self.save()?;
        }
        Ok(())
    }

    /// Appends a selection decision and persists immediately.
    pub fn record_ai_decision(&mut self, decision: AiDecision) -> Result<()> {
        self.history.ai_decision_history.push(decision);
        self.save()
    }

    /// Upserts the performance entry for a category.
    pub fn record_category_performance(&mut self, url: &str, products_found: usize) -> Result<()> {
        self.history.category_performance.insert(
            url.to_string(),
            CategoryPerformance {
                products_found,
                last_scraped: Utc::now(),
                performance_score: CategoryPerformance::score_for(products_found),
            },
        );
        self.save()
    }

    /// Best categories by score, then product count.
    pub fn top_categories(&self, n: usize) -> Vec<(String, CategoryPerformance)> {
        let mut entries: Vec<_> = self
            .history
            .category_performance
            .iter()
            .map(|(url, perf)| (url.clone(), perf.clone()))
            .collect();

        entries.sort_by(|a, b| {
            b.1.performance_score
                .total_cmp(&a.1.performance_score)
                .then(b.1.products_found.cmp(&a.1.products_found))
                .then(a.0.cmp(&b.0))
        });
        entries.truncate(n);
        entries
    }

    /// Moves the current file aside under a timestamped name and starts empty.
    pub fn archive(&mut self) -> Result<Option<PathBuf>> {
        let archived = if self.path.exists() {
            let stamp = Utc::now().format("%Y%m%dT%H%M%S");
            let stem = self.path.file_stem().and_then(|s| s.to_str()).unwrap_or("crawl_history");
            let target = self.path.with_file_name(format!("{}.{}.json", stem, stamp));

            std::fs::rename(&self.path, &target)
                .with_context(|| format!("Failed to archive {}", self.path.display()))?;
            info!("Archived crawl history to {}", target.display());
            Some(target)
        } else {
            None
        };

        self.history = CrawlHistory::default();
        Ok(archived)
    }

    pub fn save(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.history)
    }
}

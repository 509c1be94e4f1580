//! AI suggestion log and the memory derived from it.
//!
//! The log file (a JSON array of entries) is the source of truth. `AiMemory`
//! is rebuilt by replaying it and kept in step as new entries are appended.

use crate::storage::{read_json, write_json_atomic};
use crate::urls;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Price band strategy: crawl cheap products first, then pricier ones.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PricePhase {
    #[default]
    Low,
    Medium,
}

impl PricePhase {
    /// The phase after this one. Phases only advance.
    pub fn next(self) -> Option<PricePhase> {
        match self {
            PricePhase::Low => Some(PricePhase::Medium),
            PricePhase::Medium => None,
        }
    }
}

impl fmt::Display for PricePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PricePhase::Low => write!(f, "low"),
            PricePhase::Medium => write!(f, "medium"),
        }
    }
}

/// What produced a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// The suggester returned a well-formed ranking.
    Suggestion,
    /// The heuristic picked categories (suggester failed, malformed or disabled).
    Fallback,
    /// The price phase advanced.
    PhaseTransition,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Suggestion => write!(f, "suggestion"),
            EntryKind::Fallback => write!(f, "fallback"),
            EntryKind::PhaseTransition => write!(f, "phase_transition"),
        }
    }
}

/// A proposed category that did not make it into the crawl plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedUrl {
    pub url: String,
    pub reason: String,
    /// Fetch errors are transient: the URL may be proposed again later.
    #[serde(default)]
    pub transient: bool,
}

/// One selection cycle outcome as written to the suggestion log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: EntryKind,
    pub price_phase: PricePhase,
    #[serde(default)]
    pub ai_attempted: bool,
    #[serde(default)]
    pub top_urls: Vec<String>,
    #[serde(default)]
    pub secondary_urls: Vec<String>,
    #[serde(default)]
    pub skip_urls: Vec<String>,
    #[serde(default)]
    pub accepted_urls: Vec<String>,
    #[serde(default)]
    pub rejected: Vec<RejectedUrl>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub progression_strategy: String,
    #[serde(default)]
    pub total_products_processed: u64,
}

impl SuggestionEntry {
    pub fn new(kind: EntryKind, price_phase: PricePhase) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            price_phase,
            ai_attempted: false,
            top_urls: Vec::new(),
            secondary_urls: Vec::new(),
            skip_urls: Vec::new(),
            accepted_urls: Vec::new(),
            rejected: Vec::new(),
            reasoning: String::new(),
            progression_strategy: String::new(),
            total_products_processed: 0,
        }
    }

    /// Top and secondary URLs: everything the entry proposed for crawling.
    pub fn proposed(&self) -> impl Iterator<Item = &String> {
        self.top_urls.iter().chain(&self.secondary_urls)
    }
}

/// Append-only JSON array of suggestion entries.
#[derive(Debug, Clone)]
pub struct SuggestionLog {
    path: PathBuf,
}

impl SuggestionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads all entries; a missing or unreadable log yields an empty list.
    pub fn load(&self) -> Vec<SuggestionEntry> {
        match read_json::<Vec<SuggestionEntry>>(&self.path) {
            Ok(Some(entries)) => entries,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Ignoring unreadable suggestion log ({:#})", e);
                Vec::new()
            }
        }
    }

    pub fn write(&self, entries: &[SuggestionEntry]) -> Result<()> {
        write_json_atomic(&self.path, entries)
    }
}

/// Cross-run view of what has been suggested, failed, and processed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AiMemory {
    pub previously_suggested_urls: BTreeSet<String>,
    /// Rejected URLs with the latest rejection reason
    pub previously_failed: BTreeMap<String, String>,
    pub total_products_processed: u64,
    pub total_ai_calls: u64,
    pub price_phase: PricePhase,

    /// Normalized URL -> phases it was proposed in
    #[serde(skip)]
    suggested_phases: HashMap<String, BTreeSet<PricePhase>>,
}

impl AiMemory {
    /// Rebuilds memory from log entries in order.
    pub fn replay(entries: &[SuggestionEntry]) -> Self {
        let mut memory = Self::default();
        for entry in entries {
            memory.apply(entry);
        }
        memory
    }

    /// Folds one entry into the memory.
    pub fn apply(&mut self, entry: &SuggestionEntry) {
        if entry.kind == EntryKind::PhaseTransition {
            self.price_phase = self.price_phase.max(entry.price_phase);
        }

        if entry.ai_attempted {
            self.total_ai_calls += 1;
        }

        let transient: HashSet<&str> =
            entry.rejected.iter().filter(|r| r.transient).map(|r| r.url.as_str()).collect();

        for url in entry.proposed() {
            if transient.contains(url.as_str()) {
                continue;
            }
            self.previously_suggested_urls.insert(url.clone());
            self.suggested_phases
                .entry(urls::normalize(url))
                .or_default()
                .insert(entry.price_phase);
        }

        for rejected in &entry.rejected {
            self.previously_failed.insert(rejected.url.clone(), rejected.reason.clone());
        }
        for url in &entry.accepted_urls {
            self.previously_failed.remove(url);
        }

        self.total_products_processed =
            self.total_products_processed.max(entry.total_products_processed);
    }

    /// True if the URL (or a query/slash variant) was proposed before.
    pub fn was_suggested(&self, url: &str) -> bool {
        self.previously_suggested_urls.contains(url)
            || self.suggested_phases.contains_key(&urls::normalize(url))
    }

    /// True if the URL was proposed while crawling in `phase`.
    pub fn was_suggested_in(&self, url: &str, phase: PricePhase) -> bool {
        self.suggested_phases
            .get(&urls::normalize(url))
            .is_some_and(|phases| phases.contains(&phase))
    }

    /// True if the URL was proposed in a phase before `phase`.
    pub fn was_suggested_before(&self, url: &str, phase: PricePhase) -> bool {
        self.suggested_phases
            .get(&urls::normalize(url))
            .and_then(|phases| phases.first())
            .is_some_and(|first| *first < phase)
    }
}

/// Suggestion log plus its derived memory, kept in sync.
#[derive(Debug)]
pub struct AiMemoryStore {
    log: SuggestionLog,
    entries: Vec<SuggestionEntry>,
    memory: AiMemory,
}

impl AiMemoryStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let log = SuggestionLog::new(path);
        let entries = log.load();
        let memory = AiMemory::replay(&entries);

        debug!(
            "Replayed {} suggestion entries ({} URLs suggested, phase {})",
            entries.len(),
            memory.previously_suggested_urls.len(),
            memory.price_phase
        );

        Self { log, entries, memory }
    }

    pub fn memory(&self) -> &AiMemory {
        &self.memory
    }

    pub fn entries(&self) -> &[SuggestionEntry] {
        &self.entries
    }

    pub fn price_phase(&self) -> PricePhase {
        self.memory.price_phase
    }

    /// Persists the entry, then folds it into memory.
    pub fn append(&mut self, mut entry: SuggestionEntry) -> Result<()> {
        entry.total_products_processed =
            entry.total_products_processed.max(self.memory.total_products_processed);

        self.entries.push(entry);
        if let Err(e) = self.log.write(&self.entries) {
            self.entries.pop();
            return Err(e);
        }

        if let Some(entry) = self.entries.last() {
            self.memory.apply(entry);
        }
        Ok(())
    }

    /// Advances the in-memory processed counter; captured by the next entry.
    pub fn add_products(&mut self, count: u64) {
        self.memory.total_products_processed += count;
    }

    /// Advances the price phase and logs the transition. `None` if already at the last phase.
    pub fn advance_phase(&mut self, reasoning: &str) -> Result<Option<PricePhase>> {
        let Some(next) = self.memory.price_phase.next() else {
            return Ok(None);
        };

        let mut entry = SuggestionEntry::new(EntryKind::PhaseTransition, next);
        entry.reasoning = reasoning.to_string();
        self.append(entry)?;

        info!("Price phase advanced to {}", next);
        Ok(Some(next))
    }
}

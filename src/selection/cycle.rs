//! One category selection cycle.
//!
//! discover -> classify -> dedupe -> filter-seen -> (phase check) -> request ->
//! parse or fallback -> scope filter -> hard filter -> validate with backfill ->
//! optimize -> persist.

use crate::classifier::{self, Classification};
use crate::config::Config;
use crate::history::{
    AiDecision, AiMemoryStore, EntryKind, HistoryStore, PricePhase, RejectedUrl, SuggestionEntry,
};
use crate::selection::dedup::{self, CategoryGroup};
use crate::selection::optimize::optimize_url;
use crate::selection::suggester::{
    parse_suggestion, AiSuggester, CandidateSummary, FailedSummary, PerformanceSummary,
    Suggestion, SuggestionContext, TOP_PICKS,
};
use crate::selection::validator::{CachedValidator, CategoryValidator, ProductivityValidator};
use crate::selection::CategoryNode;
use crate::supplier::PageFetcher;
use crate::urls;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Cap on URL lists handed to the suggester.
const MAX_CONTEXT_URLS: usize = 100;

/// A category chosen for crawling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedCategory {
    /// Category URL as discovered or proposed
    pub source_url: String,
    /// Listing URL to fetch, with paging/sort parameters
    pub url: String,
    pub name: String,
    /// Product tiles seen during validation
    pub product_count: usize,
}

/// The categories one cycle committed to, in crawl order.
#[derive(Debug, Clone)]
pub struct CrawlPlan {
    pub phase: PricePhase,
    pub kind: EntryKind,
    pub categories: Vec<PlannedCategory>,
    pub reasoning: String,
}

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Planned(CrawlPlan),
    /// No unseen friendly or neutral category remains in the last phase.
    Exhausted,
}

/// What the request stage produced, before scope and hard filtering.
struct Proposal {
    kind: EntryKind,
    ai_attempted: bool,
    suggestion: Suggestion,
}

/// Selects the next categories to crawl for one supplier.
pub struct SelectionCycle<'a> {
    config: &'a Config,
    supplier_url: &'a str,
    fetcher: &'a dyn PageFetcher,
    suggester: Option<&'a dyn AiSuggester>,
    force_resuggest: bool,
}

impl<'a> SelectionCycle<'a> {
    pub fn new(config: &'a Config, supplier_url: &'a str, fetcher: &'a dyn PageFetcher) -> Self {
        Self { config, supplier_url, fetcher, suggester: None, force_resuggest: false }
    }

    pub fn with_suggester(mut self, suggester: Option<&'a dyn AiSuggester>) -> Self {
        self.suggester = suggester;
        self
    }

    /// Ignore earlier suggestions when filtering candidates. Visited URLs stay excluded.
    pub fn force_resuggest(mut self, force: bool) -> Self {
        self.force_resuggest = force;
        self
    }

    /// Runs the cycle. Discovery failure is an error; suggester problems are not.
    pub async fn run(
        &self,
        history: &mut HistoryStore,
        memory: &mut AiMemoryStore,
    ) -> Result<CycleOutcome> {
        let validator = CachedValidator::new(ProductivityValidator::new(
            self.fetcher,
            self.config.selection.min_products,
        ));

        loop {
            let phase = memory.price_phase();

            let links = self
                .fetcher
                .discover_categories(self.supplier_url)
                .await
                .with_context(|| format!("Failed to discover categories on {}", self.supplier_url))?;

            let mut nodes: Vec<CategoryNode> = links
                .into_iter()
                .map(|link| CategoryNode::classified(link.url, link.name))
                .collect();
            debug!("Discovered {} categories", nodes.len());

            let candidate_urls: Vec<String> = nodes
                .iter()
                .filter(|n| n.classification.is_candidate())
                .map(|n| n.url.clone())
                .collect();

            let deduped = dedup::dedupe(&candidate_urls, &validator, &self.config.selection).await;
            let tree = dedup::build_tree(&candidate_urls, self.config.selection.max_child_segments);
            annotate(&mut nodes, &tree, &validator);

            let by_url: HashMap<String, &CategoryNode> =
                nodes.iter().map(|n| (urls::normalize(&n.url), n)).collect();

            let fresh: Vec<&CategoryNode> = deduped
                .iter()
                .filter(|url| !self.is_seen(url, phase, history, memory))
                .filter_map(|url| by_url.get(&urls::normalize(url)).copied())
                .collect();

            if fresh.is_empty() {
                let reason = format!("No unseen friendly or neutral categories left in {} phase", phase);
                match memory.advance_phase(&reason)? {
                    Some(next) => {
                        history.record_ai_decision(AiDecision {
                            timestamp: Utc::now(),
                            kind: EntryKind::PhaseTransition,
                            categories_suggested: Vec::new(),
                            skip_urls: Vec::new(),
                            reasoning: format!("{}; moving to {} phase", reason, next),
                        })?;
                        info!("{}; restarting discovery in {} phase", reason, next);
                        continue;
                    }
                    None => {
                        info!("{}; supplier exhausted", reason);
                        return Ok(CycleOutcome::Exhausted);
                    }
                }
            }

            info!("{} candidate categories in {} phase", fresh.len(), phase);

            let proposal = self.request(&fresh, phase, history, memory).await;
            return self.finish(proposal, &fresh, &by_url, phase, &validator, history, memory).await;
        }
    }

    /// A category counts as seen when it was proposed in the current phase
    /// or visited outside of an earlier phase's crawl. Forcing ignores the
    /// suggestion log, so any visit counts.
    fn is_seen(
        &self,
        url: &str,
        phase: PricePhase,
        history: &HistoryStore,
        memory: &AiMemoryStore,
    ) -> bool {
        if self.force_resuggest {
            return history.is_previously_visited(url);
        }
        let memory = memory.memory();
        if memory.was_suggested_in(url, phase) {
            return true;
        }
        history.is_previously_visited(url) && !memory.was_suggested_before(url, phase)
    }

    async fn request(
        &self,
        fresh: &[&CategoryNode],
        phase: PricePhase,
        history: &HistoryStore,
        memory: &AiMemoryStore,
    ) -> Proposal {
        let Some(suggester) = self.suggester else {
            return fallback(fresh, self.config.selection.max_backfill, false, "suggester disabled");
        };

        let context = self.context(fresh, phase, history, memory);
        let raw = match suggester.suggest(&context).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Suggester failed, using heuristic: {:#}", e);
                let reason = format!("suggester error: {:#}", e);
                return fallback(fresh, self.config.selection.max_backfill, true, &reason);
            }
        };

        match parse_suggestion(&raw) {
            Ok(suggestion) => {
                Proposal { kind: EntryKind::Suggestion, ai_attempted: true, suggestion }
            }
            Err(e) => {
                warn!("Malformed suggester reply, using heuristic: {}", e);
                let reason = format!("malformed reply: {}", e);
                fallback(fresh, self.config.selection.max_backfill, true, &reason)
            }
        }
    }

    fn context(
        &self,
        fresh: &[&CategoryNode],
        phase: PricePhase,
        history: &HistoryStore,
        memory: &AiMemoryStore,
    ) -> SuggestionContext {
        let ai = memory.memory();

        SuggestionContext {
            supplier_url: self.supplier_url.to_string(),
            price_phase: phase,
            price_band: self.config.price_band(phase),
            candidates: fresh
                .iter()
                .take(MAX_CONTEXT_URLS)
                .map(|n| CandidateSummary {
                    url: n.url.clone(),
                    name: n.name.clone(),
                    classification: n.classification,
                    product_count: n.validated_product_count,
                    subcategories: n.children.len(),
                })
                .collect(),
            top_performers: history
                .top_categories(self.config.selection.top_performers)
                .into_iter()
                .map(|(url, perf)| PerformanceSummary {
                    url,
                    products_found: perf.products_found,
                    performance_score: perf.performance_score,
                })
                .collect(),
            previously_suggested: ai
                .previously_suggested_urls
                .iter()
                .take(MAX_CONTEXT_URLS)
                .cloned()
                .collect(),
            previously_failed: ai
                .previously_failed
                .iter()
                .take(MAX_CONTEXT_URLS)
                .map(|(url, reason)| FailedSummary { url: url.clone(), reason: reason.clone() })
                .collect(),
            total_products_processed: ai.total_products_processed,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        proposal: Proposal,
        fresh: &[&CategoryNode],
        by_url: &HashMap<String, &CategoryNode>,
        phase: PricePhase,
        validator: &dyn CategoryValidator,
        history: &mut HistoryStore,
        memory: &mut AiMemoryStore,
    ) -> Result<CycleOutcome> {
        let Proposal { kind, ai_attempted, suggestion } = proposal;
        let mut entry = SuggestionEntry::new(kind, phase);
        entry.ai_attempted = ai_attempted;
        entry.reasoning = suggestion.reasoning;
        entry.progression_strategy = suggestion.progression_strategy;

        let fresh_set: HashSet<String> = fresh.iter().map(|n| urls::normalize(&n.url)).collect();
        let mut taken = HashSet::new();
        let mut skip_urls = suggestion.skip_urls;

        // Scope: supplier host, unseen, no repeats
        let mut scoped = |list: Vec<String>, entry: &mut SuggestionEntry| -> Vec<String> {
            let mut kept = Vec::new();
            for raw in list {
                let Some(url) = urls::resolve(self.supplier_url, &raw) else {
                    debug!("Dropping unusable suggestion '{}'", raw);
                    continue;
                };
                if !urls::same_host(&url, self.supplier_url) {
                    entry.rejected.push(RejectedUrl {
                        url,
                        reason: "not on supplier site".to_string(),
                        transient: false,
                    });
                    continue;
                }
                let key = urls::normalize(&url);
                if !fresh_set.contains(&key) && self.is_seen(&url, phase, history, memory) {
                    debug!("Dropping already seen suggestion {}", url);
                    continue;
                }
                if taken.insert(key) {
                    kept.push(url);
                }
            }
            kept
        };

        let top = scoped(suggestion.top_urls, &mut entry);
        let secondary = scoped(suggestion.secondary_urls, &mut entry);

        // Hard filter: an explicit avoid pattern beats whatever the suggester said
        let name_of = |url: &str| by_url.get(&urls::normalize(url)).map(|n| n.name.clone());
        let avoid = |list: Vec<String>, skip: &mut Vec<String>| -> Vec<String> {
            list.into_iter()
                .filter(|url| {
                    let (_, path) = urls::host_and_path(url);
                    let name = name_of(url).unwrap_or_default();
                    let hit = classifier::avoid_match(&path)
                        .or_else(|| classifier::avoid_match(&name));
                    if let Some(group) = hit {
                        info!("Skipping {} ({} category)", url, group);
                        skip.push(url.clone());
                        false
                    } else {
                        true
                    }
                })
                .collect()
        };
        let top = avoid(top, &mut skip_urls);
        let secondary = avoid(secondary, &mut skip_urls);

        entry.top_urls = top.clone();
        entry.secondary_urls = secondary.clone();
        entry.skip_urls = skip_urls.clone();

        // Validate top picks, then backfill from secondary
        let mut accepted = Vec::new();
        for url in &top {
            let validation = validator.validate(url).await;
            if validation.is_productive {
                accepted.push((url.clone(), validation.product_count));
            } else {
                entry.rejected.push(RejectedUrl {
                    url: url.clone(),
                    reason: validation.rejection_reason(),
                    transient: validation.is_transient(),
                });
            }
        }

        let mut backfill_tries = 0;
        for url in &secondary {
            if accepted.len() >= TOP_PICKS || backfill_tries >= self.config.selection.max_backfill {
                break;
            }
            backfill_tries += 1;

            let validation = validator.validate(url).await;
            if validation.is_productive {
                info!("Backfilled {} from secondary list", url);
                accepted.push((url.clone(), validation.product_count));
            } else {
                entry.rejected.push(RejectedUrl {
                    url: url.clone(),
                    reason: validation.rejection_reason(),
                    transient: validation.is_transient(),
                });
            }
        }

        let categories: Vec<PlannedCategory> = accepted
            .into_iter()
            .map(|(url, product_count)| PlannedCategory {
                name: name_of(&url).unwrap_or_default(),
                url: optimize_url(&url, &self.config.selection.optimize_params),
                source_url: url,
                product_count,
            })
            .collect();

        entry.accepted_urls = categories.iter().map(|c| c.source_url.clone()).collect();
        let reasoning = entry.reasoning.clone();

        memory.append(entry)?;
        history.record_ai_decision(AiDecision {
            timestamp: Utc::now(),
            kind,
            categories_suggested: categories.iter().map(|c| c.source_url.clone()).collect(),
            skip_urls,
            reasoning: reasoning.clone(),
        })?;

        info!(
            "Selected {} categories ({}, {} phase)",
            categories.len(),
            kind,
            phase
        );

        Ok(CycleOutcome::Planned(CrawlPlan { phase, kind, categories, reasoning }))
    }
}

/// Fills children and validated counts from the dedup pass.
fn annotate<V: CategoryValidator>(
    nodes: &mut [CategoryNode],
    tree: &[CategoryGroup],
    validator: &CachedValidator<V>,
) {
    let children: HashMap<String, &Vec<String>> =
        tree.iter().map(|g| (urls::normalize(&g.parent), &g.children)).collect();

    for node in nodes.iter_mut() {
        if let Some(kids) = children.get(&urls::normalize(&node.url)) {
            node.children = (*kids).clone();
        }
        node.validated_product_count = validator.cached(&node.url).map(|v| v.product_count);
    }
}

/// Deterministic pick: the first friendly candidates in discovery order are the
/// top picks. Further friendly ones, then neutral ones, become backups.
fn fallback(fresh: &[&CategoryNode], backups: usize, ai_attempted: bool, reason: &str) -> Proposal {
    let of_class = |class: Classification| {
        fresh.iter().filter(move |n| n.classification == class).map(|n| n.url.clone())
    };

    let top: Vec<String> = of_class(Classification::Friendly).take(TOP_PICKS).collect();
    let secondary: Vec<String> = of_class(Classification::Friendly)
        .skip(TOP_PICKS)
        .chain(of_class(Classification::Neutral))
        .take(backups)
        .collect();

    Proposal {
        kind: EntryKind::Fallback,
        ai_attempted,
        suggestion: Suggestion {
            top_urls: top,
            secondary_urls: secondary,
            skip_urls: Vec::new(),
            reasoning: format!("heuristic fallback: {}", reason),
            progression_strategy: String::new(),
        },
    }
}

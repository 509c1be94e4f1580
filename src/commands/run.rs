//! Run command: select categories, crawl them, match products, write links.

use crate::config::Config;
use crate::filters::FilterChain;
use crate::history::{AiMemoryStore, HistoryStore, PricePhase, VisitTier};
use crate::linking::{product_identifier, LinkingRecord, LinkingWriter};
use crate::matching::{AmazonSearchMatcher, MatchEngine};
use crate::selection::{
    AiSuggester, CycleOutcome, OpenAiSuggester, PlannedCategory, SelectionCycle,
};
use crate::state::{ProductStatus, RunStats, StateManager, StateOptions};
use crate::storage::SupplierPaths;
use crate::supplier::{PageFetcher, ProductTile, SupplierClient};
use crate::urls;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Consecutive cycles that may end with nothing crawlable before the run stops.
const MAX_EMPTY_PLANS: usize = 3;

/// Per-invocation switches from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub supplier_url: String,
    /// Archive the crawl history and reset processing state first
    pub clear_cache: bool,
    /// Ask the suggester again even for categories it already proposed
    pub force_ai: bool,
    /// Use the heuristic selection only
    pub no_ai: bool,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum RunOutcome {
    /// No unseen candidate category is left in the last price phase
    Exhausted,
    /// `max_products` was reached; the state is paused for resume
    LimitReached,
    /// Every processed product failed; the batch restarts on the next run
    Poisoned,
    /// Several cycles in a row produced no usable category
    Stalled,
    /// The crawl could not continue; the state is marked as errored
    Failed(String),
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Exhausted => write!(f, "exhausted"),
            RunOutcome::LimitReached => write!(f, "limit reached"),
            RunOutcome::Poisoned => write!(f, "poisoned state reset"),
            RunOutcome::Stalled => write!(f, "stalled"),
            RunOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub supplier: String,
    pub supplier_key: String,
    pub data_dir: PathBuf,
    pub outcome: RunOutcome,
    pub price_phase: PricePhase,
    pub cycles: usize,
    pub resumed: bool,
    pub categories_crawled: usize,
    pub products_found: usize,
    pub processed: usize,
    pub matched: usize,
    pub no_match: usize,
    pub errors: usize,
    pub skipped: usize,
    pub links_written: usize,
    pub fetch_errors: usize,
    /// Stats of the last completed product list
    pub last_batch: Option<RunStats>,
}

impl RunSummary {
    fn new(supplier: &str, supplier_key: &str, data_dir: PathBuf) -> Self {
        Self {
            supplier: supplier.to_string(),
            supplier_key: supplier_key.to_string(),
            data_dir,
            outcome: RunOutcome::Exhausted,
            price_phase: PricePhase::Low,
            cycles: 0,
            resumed: false,
            categories_crawled: 0,
            products_found: 0,
            processed: 0,
            matched: 0,
            no_match: 0,
            errors: 0,
            skipped: 0,
            links_written: 0,
            fetch_errors: 0,
            last_batch: None,
        }
    }
}

/// How processing of one product list ended.
enum BatchEnd {
    Completed,
    LimitReached,
    Poisoned,
}

/// Stores owned by one run.
struct Stores {
    history: HistoryStore,
    memory: AiMemoryStore,
    state: StateManager,
    linking: LinkingWriter,
}

/// Collaborators a run talks to.
pub struct Services<'a> {
    pub fetcher: &'a dyn PageFetcher,
    pub matcher: &'a dyn MatchEngine,
    pub suggester: Option<&'a dyn AiSuggester>,
}

/// Executes a supplier crawl.
pub struct RunCommand {
    config: Config,
}

impl RunCommand {
    /// Creates a new run command.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Validates setup, builds the HTTP collaborators and runs.
    ///
    /// Setup errors (bad supplier URL, missing API key) are returned before
    /// any state file is touched.
    pub async fn execute(&self, options: &RunOptions) -> Result<RunSummary> {
        let supplier_url = normalize_supplier_url(&options.supplier_url)?;

        let suggester = if self.config.ai.enabled && !options.no_ai {
            Some(
                OpenAiSuggester::new(&self.config)
                    .context("AI selection is enabled but not configured")?,
            )
        } else {
            None
        };

        let fetcher = SupplierClient::new(&self.config).context("Failed to create HTTP client")?;
        let matcher =
            AmazonSearchMatcher::new(&self.config).context("Failed to create Amazon matcher")?;

        let options = RunOptions { supplier_url, ..options.clone() };
        let services = Services {
            fetcher: &fetcher,
            matcher: &matcher,
            suggester: suggester.as_ref().map(|s| s as &dyn AiSuggester),
        };
        self.execute_with(&options, services).await
    }

    /// Runs against provided collaborators (for testing).
    pub async fn execute_with(
        &self,
        options: &RunOptions,
        services: Services<'_>,
    ) -> Result<RunSummary> {
        let key = urls::supplier_key(&options.supplier_url);
        let data_dir = self.config.resolved_data_dir();
        let paths = SupplierPaths::new(&data_dir, &key);
        info!("Crawling {} (data in {})", options.supplier_url, paths.dir().display());

        let state = StateManager::open(
            paths.state(),
            StateOptions {
                checkpoint_interval: self.config.checkpoint_interval,
                poison_threshold: self.config.poison_threshold,
            },
        )?;
        let mut stores = Stores {
            history: HistoryStore::open(paths.history()),
            memory: AiMemoryStore::open(paths.suggestions()),
            state,
            linking: LinkingWriter::new(paths.linking(), self.config.linking_batch_size),
        };

        if options.clear_cache {
            stores.history.archive()?;
            stores.state.reset("cache cleared")?;
        }

        let mut summary = RunSummary::new(&options.supplier_url, &key, data_dir);

        match self.crawl(options, &services, &mut stores, &mut summary).await {
            Ok(outcome) => {
                summary.outcome = outcome;
                stores.linking.flush().context("Failed to write linking map")?;
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                warn!("Run failed: {}", reason);
                if let Err(save_err) = stores.state.fail(reason.as_str()) {
                    warn!("Failed to record run failure: {:#}", save_err);
                }
                if let Err(flush_err) = stores.linking.flush() {
                    warn!("Failed to flush linking map: {:#}", flush_err);
                }
                summary.outcome = RunOutcome::Failed(reason);
            }
        }

        summary.links_written = stores.linking.written();
        summary.price_phase = stores.memory.price_phase();

        info!(
            "Run finished ({}): {} processed, {} matched, {} links written",
            summary.outcome, summary.processed, summary.matched, summary.links_written
        );
        Ok(summary)
    }

    async fn crawl(
        &self,
        options: &RunOptions,
        services: &Services<'_>,
        stores: &mut Stores,
        summary: &mut RunSummary,
    ) -> Result<RunOutcome> {
        let cycle = SelectionCycle::new(&self.config, &options.supplier_url, services.fetcher)
            .with_suggester(services.suggester)
            .force_resuggest(options.force_ai);

        let mut resuming = stores.state.is_resumable();
        let mut empty_plans = 0;

        loop {
            let categories = if resuming {
                info!(
                    "Resuming at product {} of {}",
                    stores.state.resume_index(),
                    stores.state.state().total_products
                );
                summary.resumed = true;
                stores.state.state().active_categories.clone()
            } else {
                match cycle.run(&mut stores.history, &mut stores.memory).await? {
                    CycleOutcome::Exhausted => return Ok(RunOutcome::Exhausted),
                    CycleOutcome::Planned(plan) => {
                        summary.cycles += 1;
                        if plan.categories.is_empty() {
                            empty_plans += 1;
                            warn!("Cycle produced no crawlable category ({}/{})", empty_plans, MAX_EMPTY_PLANS);
                            if empty_plans >= MAX_EMPTY_PLANS {
                                return Ok(RunOutcome::Stalled);
                            }
                            continue;
                        }
                        empty_plans = 0;
                        plan.categories
                    }
                }
            };

            let phase = stores.memory.price_phase();
            let products =
                self.collect_products(&categories, phase, services.fetcher, stores, summary).await?;

            let start = if resuming {
                resuming = false;
                let index = stores.state.resume_index();
                if index >= products.len() {
                    info!("Resume index {} is past {} products; selecting again", index, products.len());
                    stores.state.reset("resume index past the product list")?;
                    continue;
                }
                stores.state.resume(products.len())?;
                index
            } else {
                stores.state.start(
                    &summary.supplier_key,
                    &self.config_hash(phase),
                    self.settings(phase),
                    products.len(),
                    categories,
                )?;
                0
            };

            match self.process_products(&products, start, services, stores, summary).await? {
                BatchEnd::Completed => {
                    summary.last_batch = Some(stores.state.complete()?);
                }
                BatchEnd::LimitReached => {
                    stores.state.pause()?;
                    return Ok(RunOutcome::LimitReached);
                }
                BatchEnd::Poisoned => return Ok(RunOutcome::Poisoned),
            }
        }
    }

    /// Crawls the planned categories and returns the price-filtered products
    /// in discovery order.
    async fn collect_products(
        &self,
        categories: &[PlannedCategory],
        phase: PricePhase,
        fetcher: &dyn PageFetcher,
        stores: &mut Stores,
        summary: &mut RunSummary,
    ) -> Result<Vec<ProductTile>> {
        let filters = FilterChain::for_phase(&self.config, phase);
        debug!("Active filters: {}", filters.descriptions().join(", "));

        let mut seen = HashSet::new();
        let mut products = Vec::new();

        for category in categories {
            let mut page_url = category.url.clone();
            let mut found = 0;

            for page in 1..=self.config.max_pages_per_category.max(1) {
                let html = match fetcher.fetch_category(&page_url).await {
                    Ok(html) => html,
                    Err(e) => {
                        warn!("Failed to fetch {}: {}", page_url, e);
                        summary.fetch_errors += 1;
                        stores.state.record_error(format!("{}: {}", page_url, e));
                        break;
                    }
                };

                if page == 1 {
                    stores.history.record_visit(&category.source_url, VisitTier::Category)?;
                }
                if page_url != category.source_url {
                    stores.history.record_visit(&page_url, VisitTier::Subpage)?;
                }

                let tiles = fetcher.extract_product_tiles(&html, &page_url);
                debug!("{} page {}: {} products", category.source_url, page, tiles.len());
                found += tiles.len();

                for tile in filters.apply(tiles) {
                    if seen.insert(urls::normalize(&tile.url)) {
                        products.push(tile);
                    }
                }

                match fetcher.next_page_url(&html, &page_url) {
                    Some(next) if next != page_url => page_url = next,
                    _ => break,
                }
            }

            stores.history.record_category_performance(&category.source_url, found)?;
            summary.categories_crawled += 1;
            summary.products_found += found;
        }

        info!("{} products in the current price band", products.len());
        Ok(products)
    }

    async fn process_products(
        &self,
        products: &[ProductTile],
        start: usize,
        services: &Services<'_>,
        stores: &mut Stores,
        summary: &mut RunSummary,
    ) -> Result<BatchEnd> {
        let total = products.len();
        let interval = self.config.checkpoint_interval.max(1);
        let limit = self.config.max_products;

        for (index, tile) in products.iter().enumerate().skip(start) {
            if limit > 0 && summary.processed >= limit {
                info!("Reached the limit of {} products", limit);
                stores.state.checkpoint(index, total)?;
                return Ok(BatchEnd::LimitReached);
            }

            if stores.history.is_previously_visited(&tile.url) {
                debug!("Skipping previously visited {}", tile.url);
                summary.skipped += 1;
                stores.state.mark_product(&tile.url, ProductStatus::Skipped)?;
                continue;
            }

            self.pace(summary.processed).await;

            let status = self.process_product(tile, services, stores).await?;
            summary.processed += 1;
            match status {
                ProductStatus::Matched => summary.matched += 1,
                ProductStatus::NoMatch => summary.no_match += 1,
                ProductStatus::Skipped => summary.skipped += 1,
                ProductStatus::Failed | ProductStatus::Error => summary.errors += 1,
            }

            if !status.is_failure() {
                stores.history.record_visit(&tile.url, VisitTier::Page)?;
            }
            stores.memory.add_products(1);

            if stores.state.mark_product(&tile.url, status)? {
                return Ok(BatchEnd::Poisoned);
            }
            if (index + 1) % interval == 0 {
                stores.state.checkpoint(index + 1, total)?;
            }
        }

        stores.state.checkpoint(total, total)?;
        Ok(BatchEnd::Completed)
    }

    async fn process_product(
        &self,
        tile: &ProductTile,
        services: &Services<'_>,
        stores: &mut Stores,
    ) -> Result<ProductStatus> {
        let tile = services.fetcher.enrich_product(tile.clone()).await;

        let found = match services.matcher.find_match(&tile).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Matching failed for {}: {:#}", tile.url, e);
                stores.state.record_error(format!("{}: {:#}", tile.url, e));
                return Ok(ProductStatus::Error);
            }
        };

        let Some(found) = found else {
            debug!("No Amazon match for {}", tile.url);
            return Ok(ProductStatus::NoMatch);
        };

        let identifier = product_identifier(
            tile.ean.as_deref(),
            tile.sku.as_deref(),
            Some(&tile.url),
            &tile.title,
        );
        let record = LinkingRecord::new(
            identifier,
            &tile.title,
            found.asin,
            &found.title,
            found.match_method,
        )
        .with_supplier_url(&tile.url)
        .with_amazon_ean(found.ean_on_page);

        if stores.linking.add(record)? {
            Ok(ProductStatus::Matched)
        } else {
            Ok(ProductStatus::NoMatch)
        }
    }

    /// Fixed delay between products plus a longer pause every N products.
    async fn pace(&self, processed: usize) {
        if processed == 0 {
            return;
        }

        let rate = &self.config.rate_limit;
        let mut delay = rate.product_delay_ms;
        if rate.long_pause_every > 0 && processed % rate.long_pause_every == 0 {
            debug!("Long pause after {} products", processed);
            delay += rate.long_pause_ms;
        }

        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    fn settings(&self, phase: PricePhase) -> serde_json::Value {
        let band = self.config.price_band(phase);
        serde_json::json!({
            "max_products": self.config.max_products,
            "price_phase": phase,
            "min_price": band.min,
            "max_price": band.max,
            "max_pages_per_category": self.config.max_pages_per_category,
            "min_products": self.config.selection.min_products,
        })
    }

    fn config_hash(&self, phase: PricePhase) -> String {
        urls::short_hash(&self.settings(phase).to_string(), 8)
    }
}

/// Accepts a bare host (`shop.example.com`) and adds `https://`.
pub fn normalize_supplier_url(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        anyhow::bail!("Supplier URL is empty");
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = url::Url::parse(&candidate)
        .with_context(|| format!("Invalid supplier URL: {}", input))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        anyhow::bail!("Supplier URL must be an http(s) URL: {}", input);
    }
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_supplier_url() {
        assert_eq!(normalize_supplier_url("shop.example.com").unwrap(), "https://shop.example.com");
        assert_eq!(
            normalize_supplier_url(" http://shop.example.com/fr ").unwrap(),
            "http://shop.example.com/fr"
        );
        assert!(normalize_supplier_url("").is_err());
        assert!(normalize_supplier_url("ftp://shop.example.com").is_err());
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_state_is_touched() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = Some(dir.path().to_path_buf());
        config.ai.enabled = true;
        config.ai.api_key = None;

        let options = RunOptions {
            supplier_url: "https://shop.example.com".to_string(),
            ..Default::default()
        };
        let err = RunCommand::new(config).execute(&options).await.unwrap_err();

        assert!(format!("{:#}", err).contains("OPENAI_API_KEY"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_supplier_url_is_a_setup_error() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = Some(dir.path().to_path_buf());

        let options = RunOptions { supplier_url: "   ".to_string(), no_ai: true, ..Default::default() };
        assert!(RunCommand::new(config).execute(&options).await.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_config_hash_tracks_settings() {
        let mut config = Config::default();
        let a = RunCommand::new(config.clone()).config_hash(PricePhase::Low);
        assert_eq!(a, RunCommand::new(config.clone()).config_hash(PricePhase::Low));
        assert_ne!(a, RunCommand::new(config.clone()).config_hash(PricePhase::Medium));

        config.max_products = 5;
        assert_ne!(a, RunCommand::new(config).config_hash(PricePhase::Low));
    }
}

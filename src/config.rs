//! Configuration management with TOML, environment variables, and CLI overrides.

use crate::history::PricePhase;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Application configuration with layered loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Proxy URL (e.g., socks5://host:port)
    #[serde(default)]
    pub proxy: Option<String>,

    /// Base delay between HTTP requests in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Random jitter added to delay (0 to this value)
    #[serde(default = "default_delay_jitter_ms")]
    pub delay_jitter_ms: u64,

    /// Root directory for per-supplier state files
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Output format
    #[serde(default)]
    pub format: OutputFormat,

    /// Maximum products to process per run (0 = unlimited)
    #[serde(default)]
    pub max_products: usize,

    /// Price band override: minimum supplier price
    #[serde(default)]
    pub min_price: Option<f64>,

    /// Price band override: maximum supplier price
    #[serde(default)]
    pub max_price: Option<f64>,

    /// Persist processing state every N product marks
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,

    /// Flush linking records once this many are buffered
    #[serde(default = "default_linking_batch_size")]
    pub linking_batch_size: usize,

    /// Failed products needed, with no success at all, before the state counts as poisoned
    #[serde(default = "default_poison_threshold")]
    pub poison_threshold: usize,

    /// Pagination pages followed per category
    #[serde(default = "default_max_pages_per_category")]
    pub max_pages_per_category: u32,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub price_bands: PriceBands,

    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub matching: MatchingConfig,

    #[serde(default)]
    pub selectors: SelectorConfig,
}

fn default_delay_ms() -> u64 {
    2000
}

fn default_delay_jitter_ms() -> u64 {
    3000
}

fn default_checkpoint_interval() -> usize {
    10
}

fn default_linking_batch_size() -> usize {
    40
}

fn default_poison_threshold() -> usize {
    1
}

fn default_max_pages_per_category() -> u32 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proxy: None,
            delay_ms: default_delay_ms(),
            delay_jitter_ms: default_delay_jitter_ms(),
            data_dir: None,
            format: OutputFormat::Table,
            max_products: 0,
            min_price: None,
            max_price: None,
            checkpoint_interval: default_checkpoint_interval(),
            linking_batch_size: default_linking_batch_size(),
            poison_threshold: default_poison_threshold(),
            max_pages_per_category: default_max_pages_per_category(),
            rate_limit: RateLimitConfig::default(),
            price_bands: PriceBands::default(),
            selection: SelectionConfig::default(),
            ai: AiConfig::default(),
            matching: MatchingConfig::default(),
            selectors: SelectorConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Loads configuration with fallback to default locations.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::from_file(path);
        }

        let local_config = Path::new("fba-scout.toml");
        if local_config.exists() {
            debug!("Found fba-scout.toml in current directory");
            return Self::from_file(local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("fba-scout").join("config.toml");
            if xdg_config.exists() {
                debug!("Found config in XDG config directory");
                return Self::from_file(xdg_config);
            }
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Applies environment variable overrides.
    pub fn with_env(mut self) -> Self {
        if let Ok(proxy) = std::env::var("FBA_PROXY") {
            self.proxy = Some(proxy);
        }

        if let Ok(delay) = std::env::var("FBA_DELAY") {
            if let Ok(d) = delay.parse() {
                self.delay_ms = d;
            }
        }

        if let Ok(dir) = std::env::var("FBA_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.trim().is_empty() {
                self.ai.api_key = Some(key);
            }
        }

        if let Ok(model) = std::env::var("FBA_AI_MODEL") {
            self.ai.model = model;
        }

        self
    }

    /// Resolves the data directory, falling back to the platform data dir.
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("fba-scout")
        })
    }

    /// Returns the supplier price band for a phase, with CLI overrides applied.
    pub fn price_band(&self, phase: PricePhase) -> PriceBand {
        let base = match phase {
            PricePhase::Low => self.price_bands.low,
            PricePhase::Medium => self.price_bands.medium,
        };

        PriceBand {
            min: self.min_price.unwrap_or(base.min),
            max: self.max_price.unwrap_or(base.max),
        }
    }
}

/// Request pacing between product analyses and fetch retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Fixed pause after every product
    #[serde(default = "default_product_delay_ms")]
    pub product_delay_ms: u64,

    /// Take a longer pause every N products (0 disables)
    #[serde(default = "default_long_pause_every")]
    pub long_pause_every: usize,

    #[serde(default = "default_long_pause_ms")]
    pub long_pause_ms: u64,

    /// Attempts per fetch before giving up
    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,

    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
}

fn default_product_delay_ms() -> u64 {
    1500
}

fn default_long_pause_every() -> usize {
    25
}

fn default_long_pause_ms() -> u64 {
    30_000
}

fn default_fetch_attempts() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    1000
}

fn default_retry_max_ms() -> u64 {
    15_000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            product_delay_ms: default_product_delay_ms(),
            long_pause_every: default_long_pause_every(),
            long_pause_ms: default_long_pause_ms(),
            fetch_attempts: default_fetch_attempts(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
        }
    }
}

/// Inclusive supplier price range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBand {
    pub min: f64,
    pub max: f64,
}

/// Price thresholds for the cheap-first then pricier strategy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceBands {
    #[serde(default = "default_low_band")]
    pub low: PriceBand,

    #[serde(default = "default_medium_band")]
    pub medium: PriceBand,
}

fn default_low_band() -> PriceBand {
    PriceBand { min: 0.0, max: 15.0 }
}

fn default_medium_band() -> PriceBand {
    PriceBand { min: 15.0, max: 40.0 }
}

impl Default for PriceBands {
    fn default() -> Self {
        Self { low: default_low_band(), medium: default_medium_band() }
    }
}

/// Category selection tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Product tiles a category needs to be worth crawling
    #[serde(default = "default_min_products")]
    pub min_products: usize,

    /// Path segments a URL may add below its parent and still count as a direct child
    #[serde(default = "default_max_child_segments")]
    pub max_child_segments: usize,

    /// Historical categories summarized for the suggester
    #[serde(default = "default_top_performers")]
    pub top_performers: usize,

    /// Secondary URLs tried when top picks fail validation
    #[serde(default = "default_max_backfill")]
    pub max_backfill: usize,

    /// Query parameters appended to each category URL
    #[serde(default = "default_optimize_params")]
    pub optimize_params: BTreeMap<String, String>,
}

fn default_min_products() -> usize {
    2
}

fn default_max_child_segments() -> usize {
    1
}

fn default_top_performers() -> usize {
    10
}

fn default_max_backfill() -> usize {
    3
}

fn default_optimize_params() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("dir".to_string(), "asc".to_string()),
        ("limit".to_string(), "100".to_string()),
        ("order".to_string(), "price".to_string()),
    ])
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_products: default_min_products(),
            max_child_segments: default_max_child_segments(),
            top_performers: default_top_performers(),
            max_backfill: default_max_backfill(),
            optimize_params: default_optimize_params(),
        }
    }
}

/// OpenAI-compatible category suggester.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_ai_enabled")]
    pub enabled: bool,

    /// Base URL of the chat-completions API
    #[serde(default = "default_ai_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_ai_model")]
    pub model: String,

    /// API key (usually from OPENAI_API_KEY)
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_ai_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_ai_temperature")]
    pub temperature: f32,

    #[serde(default = "default_ai_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_ai_enabled() -> bool {
    true
}

fn default_ai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_ai_max_tokens() -> u32 {
    1200
}

fn default_ai_temperature() -> f32 {
    0.2
}

fn default_ai_timeout_secs() -> u64 {
    60
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: default_ai_enabled(),
            endpoint: default_ai_endpoint(),
            model: default_ai_model(),
            api_key: None,
            max_tokens: default_ai_max_tokens(),
            temperature: default_ai_temperature(),
            timeout_secs: default_ai_timeout_secs(),
        }
    }
}

/// Amazon search matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Marketplace searched for matches
    #[serde(default = "default_amazon_base_url")]
    pub amazon_base_url: String,

    /// Share of supplier title tokens an Amazon title must contain (0.0-1.0)
    #[serde(default = "default_title_match_threshold")]
    pub title_match_threshold: f64,

    /// Search results inspected per query
    #[serde(default = "default_match_candidates")]
    pub candidates: usize,
}

fn default_amazon_base_url() -> String {
    "https://www.amazon.com".to_string()
}

fn default_title_match_threshold() -> f64 {
    0.6
}

fn default_match_candidates() -> usize {
    5
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            amazon_base_url: default_amazon_base_url(),
            title_match_threshold: default_title_match_threshold(),
            candidates: default_match_candidates(),
        }
    }
}

/// Site-specific CSS selector overrides. Unset fields use generic defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectorConfig {
    #[serde(default)]
    pub product_tile: Option<String>,

    #[serde(default)]
    pub category_link: Option<String>,

    #[serde(default)]
    pub next_page: Option<String>,
}

/// Output format for results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Markdown,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown format: {}. Use: table, json, markdown, csv", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.delay_ms, 2000);
        assert_eq!(config.max_products, 0);
        assert_eq!(config.checkpoint_interval, 10);
        assert_eq!(config.linking_batch_size, 40);
        assert_eq!(config.poison_threshold, 1);
        assert_eq!(config.selection.min_products, 2);
        assert_eq!(config.selection.max_child_segments, 1);
        assert_eq!(config.format, OutputFormat::Table);
        assert!(config.ai.enabled);
        assert!(config.ai.api_key.is_none());
        assert!(config.proxy.is_none());
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("table".parse::<OutputFormat>().unwrap(), OutputFormat::Table);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("md".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert_eq!("csv".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);

        let err = "invalid".parse::<OutputFormat>().unwrap_err();
        assert!(err.contains("Unknown format"));
    }

    #[test]
    fn test_output_format_display() {
        assert_eq!(OutputFormat::Table.to_string(), "table");
        assert_eq!(OutputFormat::Markdown.to_string(), "markdown");
    }

    #[test]
    fn test_config_from_toml_sections() {
        let toml = r#"
            delay_ms = 500
            max_products = 200
            linking_batch_size = 10

            [price_bands.low]
            min = 1.0
            max = 10.0

            [selection]
            min_products = 4
            max_child_segments = 2

            [ai]
            enabled = false
            model = "local-model"

            [selectors]
            product_tile = ".grid .item"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.delay_ms, 500);
        assert_eq!(config.max_products, 200);
        assert_eq!(config.linking_batch_size, 10);
        assert_eq!(config.price_bands.low, PriceBand { min: 1.0, max: 10.0 });
        assert_eq!(config.price_bands.medium, default_medium_band());
        assert_eq!(config.selection.min_products, 4);
        assert_eq!(config.selection.max_child_segments, 2);
        assert_eq!(config.selection.optimize_params.get("limit").unwrap(), "100");
        assert!(!config.ai.enabled);
        assert_eq!(config.ai.model, "local-model");
        assert_eq!(config.selectors.product_tile.as_deref(), Some(".grid .item"));
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            delay_ms = 4000
            data_dir = "/tmp/fba"
            "#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.delay_ms, 4000);
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/fba")));
        assert_eq!(config.resolved_data_dir(), PathBuf::from("/tmp/fba"));
    }

    #[test]
    fn test_config_from_file_not_found() {
        let result = Config::from_file("/nonexistent/path/config.toml");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Failed to read config file"));
    }

    #[test]
    fn test_config_from_file_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid toml {{{{").unwrap();

        let err = Config::from_file(file.path()).unwrap_err().to_string();
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_price_band_overrides() {
        let mut config = Config::default();
        assert_eq!(config.price_band(PricePhase::Low), PriceBand { min: 0.0, max: 15.0 });
        assert_eq!(config.price_band(PricePhase::Medium), PriceBand { min: 15.0, max: 40.0 });

        config.max_price = Some(8.0);
        assert_eq!(config.price_band(PricePhase::Low), PriceBand { min: 0.0, max: 8.0 });
        assert_eq!(config.price_band(PricePhase::Medium), PriceBand { min: 15.0, max: 8.0 });
    }

    #[test]
    fn test_api_key_not_serialized() {
        let mut config = Config::default();
        config.ai.api_key = Some("sk-secret".to_string());

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}

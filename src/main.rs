//! fba-scout - Resumable supplier-catalog crawler for Amazon FBA research
//!
//! Picks supplier categories to crawl and links their products to Amazon listings.

use anyhow::Result;
use clap::{Parser, Subcommand};
use fba_scout::commands::{classify_inputs, RunCommand, RunOptions, StatusCommand};
use fba_scout::config::{Config, OutputFormat};
use fba_scout::format::Formatter;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "fba-scout",
    version,
    about = "Resumable supplier-catalog crawler for Amazon FBA research",
    long_about = "Chooses supplier categories to crawl (AI-ranked or heuristic), remembers what was \
                  already seen, and links supplier products to Amazon listings."
)]
struct Cli {
    /// Proxy URL (e.g., socks5://host:port)
    #[arg(long, global = true, env = "FBA_PROXY")]
    proxy: Option<String>,

    /// Delay between requests in milliseconds
    #[arg(long, global = true, env = "FBA_DELAY")]
    delay: Option<u64>,

    /// Directory holding per-supplier history, state and linking files
    #[arg(long, global = true, env = "FBA_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "table", global = true)]
    format: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a supplier and link its products to Amazon
    #[command(alias = "r")]
    Run {
        /// Supplier start URL
        supplier_url: String,

        /// Stop after this many products (0 = unlimited)
        #[arg(short, long)]
        max_products: Option<usize>,

        /// Minimum supplier price
        #[arg(long)]
        min_price: Option<f64>,

        /// Maximum supplier price
        #[arg(long)]
        max_price: Option<f64>,

        /// Archive the crawl history and start over
        #[arg(long)]
        clear_cache: bool,

        /// Ask for new suggestions even for categories already proposed
        #[arg(long)]
        force_ai: bool,

        /// Select categories with the heuristic only
        #[arg(long)]
        no_ai: bool,
    },

    /// Show what is stored for a supplier
    #[command(alias = "st")]
    Status {
        /// Supplier URL or key
        supplier: String,
    },

    /// Classify category URLs or names
    Classify {
        /// URLs or category names
        #[arg(required = true)]
        inputs: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new(Level::DEBUG.to_string())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    // Load config with layered overrides
    let mut config = Config::load(cli.config.as_deref())?.with_env();

    // Apply CLI overrides
    config.format = cli.format;

    if let Some(delay) = cli.delay {
        config.delay_ms = delay;
    }
    if let Some(proxy) = cli.proxy {
        config.proxy = Some(proxy);
    }
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(dir);
    }

    let formatter = Formatter::new(config.format);

    match cli.command {
        Commands::Run {
            supplier_url,
            max_products,
            min_price,
            max_price,
            clear_cache,
            force_ai,
            no_ai,
        } => {
            if let Some(max) = max_products {
                config.max_products = max;
            }
            if min_price.is_some() {
                config.min_price = min_price;
            }
            if max_price.is_some() {
                config.max_price = max_price;
            }

            let options = RunOptions { supplier_url, clear_cache, force_ai, no_ai };
            let summary = RunCommand::new(config).execute(&options).await?;
            println!("{}", formatter.format_run(&summary));
        }

        Commands::Status { supplier } => {
            let report = StatusCommand::new(config).execute(&supplier)?;
            println!("{}", formatter.format_status(&report));
        }

        Commands::Classify { inputs } => {
            println!("{}", formatter.format_classification(&classify_inputs(&inputs)));
        }
    }

    Ok(())
}

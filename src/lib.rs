//! fba-scout - Resumable supplier-catalog crawler for Amazon FBA research
//!
//! Picks supplier categories worth crawling, remembers what it has seen,
//! and links supplier products to Amazon listings.

pub mod classifier;
pub mod commands;
pub mod config;
pub mod filters;
pub mod format;
pub mod history;
pub mod http;
pub mod linking;
pub mod matching;
pub mod retry;
pub mod selection;
pub mod state;
pub mod storage;
pub mod supplier;
pub mod urls;

pub use classifier::Classification;
pub use config::Config;
pub use linking::{LinkingRecord, MatchMethod};
pub use supplier::ProductTile;

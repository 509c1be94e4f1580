//! Composable filters applied to supplier product tiles before matching.

pub mod price;

use crate::config::Config;
use crate::history::PricePhase;
use crate::supplier::ProductTile;

pub use price::PriceFilter;

/// Trait for filtering product tiles.
pub trait Filter: Send + Sync {
    /// Returns true if the tile passes the filter.
    fn matches(&self, tile: &ProductTile) -> bool;

    /// Returns a description of this filter.
    fn description(&self) -> String;
}

/// A chain of filters that must all pass.
pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterChain {
    /// Creates an empty filter chain.
    pub fn new() -> Self {
        Self { filters: Vec::new() }
    }

    /// Chain for a crawl in the given price phase: the phase band with CLI
    /// min/max overrides applied.
    pub fn for_phase(config: &Config, phase: PricePhase) -> Self {
        let mut chain = Self::new();
        chain.add(PriceFilter::from_band(config.price_band(phase)));
        chain
    }

    /// Adds a filter to the chain.
    pub fn add(&mut self, filter: impl Filter + 'static) -> &mut Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Checks if a tile passes all filters.
    pub fn matches(&self, tile: &ProductTile) -> bool {
        self.filters.iter().all(|f| f.matches(tile))
    }

    /// Filters a collection of tiles, preserving order.
    pub fn apply(&self, tiles: Vec<ProductTile>) -> Vec<ProductTile> {
        tiles.into_iter().filter(|t| self.matches(t)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns descriptions of all filters.
    pub fn descriptions(&self) -> Vec<String> {
        self.filters.iter().map(|f| f.description()).collect()
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

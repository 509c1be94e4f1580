//! Supplier price band filter.

use super::Filter;
use crate::config::PriceBand;
use crate::supplier::ProductTile;

/// Keeps tiles whose supplier price falls inside an inclusive band.
pub struct PriceFilter {
    min: Option<f64>,
    max: Option<f64>,
}

impl PriceFilter {
    /// Creates a new price filter with optional min/max bounds.
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    /// Creates a filter from the active price band.
    pub fn from_band(band: PriceBand) -> Self {
        Self { min: Some(band.min), max: Some(band.max) }
    }
}

impl Filter for PriceFilter {
    fn matches(&self, tile: &ProductTile) -> bool {
        // Tiles without a visible price pass; the product page may still be worth matching
        let Some(price) = tile.price else {
            return true;
        };

        if let Some(min) = self.min {
            if price < min {
                return false;
            }
        }

        if let Some(max) = self.max {
            if price > max {
                return false;
            }
        }

        true
    }

    fn description(&self) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("Price: {:.2} - {:.2}", min, max),
            (Some(min), None) => format!("Price: >= {:.2}", min),
            (None, Some(max)) => format!("Price: <= {:.2}", max),
            (None, None) => "Price: any".to_string(),
        }
    }
}

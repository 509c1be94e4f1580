//! Category selection: deduplication, productivity validation, suggestion,
//! and the cycle that ties them together.

pub mod cycle;
pub mod dedup;
pub mod optimize;
pub mod suggester;
pub mod validator;

use crate::classifier::{self, Classification};

pub use cycle::{CrawlPlan, CycleOutcome, PlannedCategory, SelectionCycle};
pub use suggester::{AiSuggester, OpenAiSuggester, SuggestionContext};
pub use validator::{CachedValidator, CategoryValidator, ProductivityValidator, Validation};

/// A discovered category during one selection cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryNode {
    pub url: String,
    pub name: String,
    pub classification: Classification,
    /// Direct children found by the dedup pass
    pub children: Vec<String>,
    pub validated_product_count: Option<usize>,
}

impl CategoryNode {
    /// Creates a node classified from its URL path and name.
    pub fn classified(url: impl Into<String>, name: impl Into<String>) -> Self {
        let url = url.into();
        let name = name.into();
        let classification = classifier::classify_category(&url, &name);

        Self { url, name, classification, children: Vec::new(), validated_product_count: None }
    }
}

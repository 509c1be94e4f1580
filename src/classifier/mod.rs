//! Category classification for FBA suitability.
//!
//! `classify` is biased toward inclusion: a friendly match always wins over an
//! avoid match. The hard avoid pass on the final selection uses `avoid_match`,
//! which ignores friendly groups entirely.

pub mod keywords;

use crate::urls;
use keywords::{KeywordGroup, AVOID_GROUPS, FRIENDLY_GROUPS};
use serde::{Deserialize, Serialize};
use std::fmt;

/// FBA suitability of a category URL or name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Friendly,
    Avoid,
    Neutral,
    /// Not classified yet. `classify` never returns this.
    #[default]
    Unknown,
}

impl Classification {
    /// Friendly and neutral categories are crawl candidates.
    pub fn is_candidate(self) -> bool {
        match self {
            Classification::Friendly | Classification::Neutral => true,
            Classification::Avoid | Classification::Unknown => false,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Classification::Friendly => "friendly",
            Classification::Avoid => "avoid",
            Classification::Neutral => "neutral",
            Classification::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Classifies a URL or category name.
pub fn classify(input: &str) -> Classification {
    let haystack = input.to_lowercase();

    if first_match(FRIENDLY_GROUPS, &haystack).is_some() {
        return Classification::Friendly;
    }

    if first_match(AVOID_GROUPS, &haystack).is_some() {
        return Classification::Avoid;
    }

    Classification::Neutral
}

/// Classifies a discovered category using its URL path and display name.
/// The host is left out so a supplier's own domain name cannot tag every category.
pub fn classify_category(url: &str, name: &str) -> Classification {
    let (_, path) = urls::host_and_path(url);
    classify(&format!("{} {}", path, name))
}

/// Name of the friendly group an input matches, if any.
pub fn friendly_match(input: &str) -> Option<&'static str> {
    first_match(FRIENDLY_GROUPS, &input.to_lowercase())
}

/// Name of the avoid group an input matches, regardless of friendly matches.
pub fn avoid_match(input: &str) -> Option<&'static str> {
    first_match(AVOID_GROUPS, &input.to_lowercase())
}

fn first_match(groups: &'static [KeywordGroup], haystack: &str) -> Option<&'static str> {
    groups
        .iter()
        .find(|group| group.keywords.iter().any(|kw| haystack.contains(kw)))
        .map(|group| group.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_friendly_categories() {
        assert_eq!(classify("https://shop.example.com/kitchen-gadgets"), Classification::Friendly);
        assert_eq!(classify("Jouets et Jeux"), Classification::Friendly);
        assert_eq!(classify("https://shop.example.de/garten/"), Classification::Friendly);
    }

    #[test]
    fn test_avoid_categories() {
        assert_eq!(classify("https://shop.example.com/perfume"), Classification::Avoid);
        assert_eq!(classify("Bijoux & Montres"), Classification::Avoid);
        assert_eq!(classify("https://shop.example.com/furniture/sofas"), Classification::Avoid);
    }

    #[test]
    fn test_neutral_default() {
        assert_eq!(classify("https://shop.example.com/new-arrivals"), Classification::Neutral);
        assert_eq!(classify(""), Classification::Neutral);
    }

    #[test]
    fn test_friendly_outranks_avoid() {
        let input = "https://shop.example.com/kitchen/cleaning-spray";
        assert_eq!(classify(input), Classification::Friendly);
        assert_eq!(friendly_match(input), Some("home_kitchen"));
        assert_eq!(avoid_match(input), Some("hazmat"));
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify("GARDEN TOOLS"), Classification::Friendly);
        assert_eq!(avoid_match("LITHIUM Batteries"), Some("hazmat"));
    }

    #[test]
    fn test_classify_category_uses_name() {
        assert_eq!(
            classify_category("https://shop.example.com/c/1234", "Toys"),
            Classification::Friendly
        );
    }

    #[test]
    fn test_classify_category_ignores_host() {
        assert_eq!(
            classify_category("https://www.home-outlet.fr/c/1234", "Divers"),
            Classification::Neutral
        );
    }

    #[test]
    fn test_is_candidate() {
        assert!(Classification::Friendly.is_candidate());
        assert!(Classification::Neutral.is_candidate());
        assert!(!Classification::Avoid.is_candidate());
        assert!(!Classification::Unknown.is_candidate());
    }

    #[test]
    fn test_classification_serde() {
        let json = serde_json::to_string(&Classification::Friendly).unwrap();
        assert_eq!(json, "\"friendly\"");
        let parsed: Classification = serde_json::from_str("\"avoid\"").unwrap();
        assert_eq!(parsed, Classification::Avoid);
    }
}

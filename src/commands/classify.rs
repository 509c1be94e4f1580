//! Classify command: shows how category URLs or names would be treated.

use crate::classifier::{self, Classification};
use serde::Serialize;

/// Classification of one input with the keyword groups that decided it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifyRow {
    pub input: String,
    pub classification: Classification,
    pub friendly_group: Option<&'static str>,
    /// Set even when a friendly group wins; the final selection pass still drops these
    pub avoid_group: Option<&'static str>,
}

pub fn classify_inputs<S: AsRef<str>>(inputs: &[S]) -> Vec<ClassifyRow> {
    inputs
        .iter()
        .map(|input| {
            let input = input.as_ref();
            ClassifyRow {
                input: input.to_string(),
                classification: classifier::classify(input),
                friendly_group: classifier::friendly_match(input),
                avoid_group: classifier::avoid_match(input),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_inputs() {
        let rows = classify_inputs(&["Garden Tools", "https://s.com/perfume", "new arrivals"]);

        assert_eq!(rows[0].classification, Classification::Friendly);
        assert!(rows[0].friendly_group.is_some());
        assert_eq!(rows[1].classification, Classification::Avoid);
        assert!(rows[1].avoid_group.is_some());
        assert_eq!(rows[2].classification, Classification::Neutral);
        assert_eq!(rows[2].friendly_group, None);
        assert_eq!(rows[2].avoid_group, None);
    }

    #[test]
    fn test_friendly_win_still_reports_avoid_group() {
        let rows = classify_inputs(&["kitchen cleaning spray"]);
        assert_eq!(rows[0].classification, Classification::Friendly);
        assert_eq!(rows[0].avoid_group, Some("hazmat"));
    }
}

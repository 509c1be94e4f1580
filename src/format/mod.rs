//! Output formatting for run summaries, status reports and classifications
//! (table, JSON, markdown, CSV).

use crate::commands::{ClassifyRow, RunSummary, StatusReport};
use crate::config::OutputFormat;
use serde::Serialize;

/// Formats command results for output.
pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    /// Creates a new formatter.
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the result of a run.
    pub fn format_run(&self, summary: &RunSummary) -> String {
        let rows = run_rows(summary);
        match self.format {
            OutputFormat::Json => Self::json(summary),
            OutputFormat::Table => Self::table_pairs(&format!("Run: {}", summary.supplier), &rows),
            OutputFormat::Markdown => {
                Self::markdown_pairs(&format!("Run: {}", summary.supplier), &rows)
            }
            OutputFormat::Csv => Self::csv_pairs(&rows),
        }
    }

    /// Formats a supplier status report.
    pub fn format_status(&self, report: &StatusReport) -> String {
        let rows = status_rows(report);
        let title = format!("Status: {}", report.supplier_key);
        match self.format {
            OutputFormat::Json => Self::json(report),
            OutputFormat::Table => {
                let mut out = Self::table_pairs(&title, &rows);
                if !report.history.top_categories.is_empty() {
                    out.push_str("\n\nTop categories:");
                    for (url, count) in &report.history.top_categories {
                        out.push_str(&format!("\n  {:>6}  {}", count, url));
                    }
                }
                if let Some(state) = &report.state {
                    if !state.recent_errors.is_empty() {
                        out.push_str("\n\nRecent errors:");
                        for error in &state.recent_errors {
                            out.push_str(&format!("\n  - {}", error));
                        }
                    }
                }
                out
            }
            OutputFormat::Markdown => {
                let mut out = Self::markdown_pairs(&title, &rows);
                if !report.history.top_categories.is_empty() {
                    out.push_str("\n\n### Top categories\n\n| Products | URL |\n|---------:|-----|");
                    for (url, count) in &report.history.top_categories {
                        out.push_str(&format!("\n| {} | {} |", count, url));
                    }
                }
                out
            }
            OutputFormat::Csv => Self::csv_pairs(&rows),
        }
    }

    /// Formats classifier output.
    pub fn format_classification(&self, rows: &[ClassifyRow]) -> String {
        match self.format {
            OutputFormat::Json => Self::json(rows),
            OutputFormat::Table => {
                let mut lines = Vec::new();
                lines.push(format!("{:<10}  {:<14}  {:<14}  {}", "Class", "Friendly", "Avoid", "Input"));
                lines.push(format!("{:-<10}  {:-<14}  {:-<14}  {:-<40}", "", "", "", ""));
                for row in rows {
                    lines.push(format!(
                        "{:<10}  {:<14}  {:<14}  {}",
                        row.classification.to_string(),
                        row.friendly_group.unwrap_or("-"),
                        row.avoid_group.unwrap_or("-"),
                        row.input
                    ));
                }
                lines.join("\n")
            }
            OutputFormat::Markdown => {
                let mut lines = Vec::new();
                lines.push("| Input | Class | Friendly | Avoid |".to_string());
                lines.push("|-------|-------|----------|-------|".to_string());
                for row in rows {
                    lines.push(format!(
                        "| {} | {} | {} | {} |",
                        row.input.replace('|', "\\|"),
                        row.classification,
                        row.friendly_group.unwrap_or(""),
                        row.avoid_group.unwrap_or("")
                    ));
                }
                lines.join("\n")
            }
            OutputFormat::Csv => {
                let mut lines = vec!["input,classification,friendly_group,avoid_group".to_string()];
                for row in rows {
                    lines.push(format!(
                        "{},{},{},{}",
                        Self::csv_escape(&row.input),
                        row.classification,
                        row.friendly_group.unwrap_or(""),
                        row.avoid_group.unwrap_or("")
                    ));
                }
                lines.join("\n")
            }
        }
    }

    // JSON formatting

    fn json<T: Serialize + ?Sized>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    }

    // Table formatting

    fn table_pairs(title: &str, rows: &[(&'static str, String)]) -> String {
        let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);

        let mut lines = Vec::new();
        lines.push(title.to_string());
        lines.push(format!("{:-<1$}", "", title.chars().count()));
        for (key, value) in rows {
            lines.push(format!("{:<width$}  {}", key, value));
        }
        lines.join("\n")
    }

    // Markdown formatting

    fn markdown_pairs(title: &str, rows: &[(&'static str, String)]) -> String {
        let mut lines = Vec::new();
        lines.push(format!("## {}", title));
        lines.push(String::new());
        lines.push("| Field | Value |".to_string());
        lines.push("|-------|-------|".to_string());
        for (key, value) in rows {
            lines.push(format!("| {} | {} |", key, value.replace('|', "\\|")));
        }
        lines.join("\n")
    }

    // CSV formatting

    fn csv_pairs(rows: &[(&'static str, String)]) -> String {
        let header: Vec<&str> = rows.iter().map(|(k, _)| *k).collect();
        let values: Vec<String> = rows.iter().map(|(_, v)| Self::csv_escape(v)).collect();
        format!("{}\n{}", header.join(","), values.join(","))
    }

    fn csv_escape(s: &str) -> String {
        if s.contains(',') || s.contains('"') || s.contains('\n') {
            format!("\"{}\"", s.replace('"', "\"\""))
        } else {
            s.to_string()
        }
    }
}

fn run_rows(summary: &RunSummary) -> Vec<(&'static str, String)> {
    let mut rows = vec![
        ("supplier_key", summary.supplier_key.clone()),
        ("outcome", summary.outcome.to_string()),
        ("price_phase", summary.price_phase.to_string()),
        ("resumed", summary.resumed.to_string()),
        ("cycles", summary.cycles.to_string()),
        ("categories_crawled", summary.categories_crawled.to_string()),
        ("products_found", summary.products_found.to_string()),
        ("processed", summary.processed.to_string()),
        ("matched", summary.matched.to_string()),
        ("no_match", summary.no_match.to_string()),
        ("errors", summary.errors.to_string()),
        ("skipped", summary.skipped.to_string()),
        ("fetch_errors", summary.fetch_errors.to_string()),
        ("links_written", summary.links_written.to_string()),
    ];
    if let Some(stats) = &summary.last_batch {
        rows.push(("products_per_hour", format!("{:.1}", stats.products_per_hour)));
    }
    rows.push(("data_dir", summary.data_dir.display().to_string()));
    rows
}

fn status_rows(report: &StatusReport) -> Vec<(&'static str, String)> {
    let history = &report.history;
    let memory = &report.memory;

    let mut rows = vec![
        ("categories_scraped", history.categories_scraped.to_string()),
        ("pages_visited", history.pages_visited.to_string()),
        ("subpages_scraped", history.subpages_scraped.to_string()),
        ("ai_decisions", history.ai_decisions.to_string()),
        (
            "last_scrape",
            history.last_scrape.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".to_string()),
        ),
        ("price_phase", memory.price_phase.to_string()),
        ("ai_calls", memory.total_ai_calls.to_string()),
        ("suggested_urls", memory.suggested_urls.to_string()),
        ("failed_urls", memory.failed_urls.to_string()),
        ("products_processed", memory.total_products_processed.to_string()),
    ];

    match &report.state {
        Some(state) => {
            rows.push(("state", state.status.to_string()));
            rows.push(("progress", format!("{}/{}", state.last_processed_index, state.total_products)));
            rows.push(("successful", state.successful_products.to_string()));
            rows.push(("failed", state.failed_products.to_string()));
        }
        None => rows.push(("state", "none".to_string())),
    }

    rows.push((
        "linked_products",
        report.linked_products.map(|n| n.to_string()).unwrap_or_else(|| "unreadable".to_string()),
    ));
    rows.push(("data_dir", report.data_dir.display().to_string()));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::status::{HistorySummary, MemorySummary, StateSummary};
    use crate::commands::{classify_inputs, RunOutcome};
    use crate::history::PricePhase;
    use crate::state::ProcessingStatus;
    use std::path::PathBuf;

    fn make_summary() -> RunSummary {
        RunSummary {
            supplier: "https://shop.example.com".to_string(),
            supplier_key: "shop.example.com".to_string(),
            data_dir: PathBuf::from("/tmp/fba"),
            outcome: RunOutcome::LimitReached,
            price_phase: PricePhase::Low,
            cycles: 1,
            resumed: false,
            categories_crawled: 3,
            products_found: 120,
            processed: 50,
            matched: 12,
            no_match: 36,
            errors: 2,
            skipped: 4,
            links_written: 12,
            fetch_errors: 0,
            last_batch: None,
        }
    }

    fn make_report() -> StatusReport {
        StatusReport {
            supplier_key: "shop.example.com".to_string(),
            data_dir: PathBuf::from("/tmp/fba/shop.example.com"),
            history: HistorySummary {
                categories_scraped: 4,
                pages_visited: 200,
                subpages_scraped: 9,
                ai_decisions: 2,
                last_scrape: None,
                top_categories: vec![("https://shop.example.com/kitchen".to_string(), 48)],
            },
            memory: MemorySummary {
                price_phase: PricePhase::Medium,
                total_ai_calls: 3,
                suggested_urls: 9,
                failed_urls: 1,
                total_products_processed: 200,
            },
            state: Some(StateSummary {
                status: ProcessingStatus::Paused,
                last_processed_index: 50,
                total_products: 120,
                successful_products: 48,
                failed_products: 2,
                active_categories: 3,
                updated_at: None,
                recent_errors: vec!["https://shop.example.com/p/9: timeout".to_string()],
            }),
            linked_products: Some(12),
        }
    }

    #[test]
    fn test_run_table() {
        let output = Formatter::new(OutputFormat::Table).format_run(&make_summary());
        assert!(output.starts_with("Run: https://shop.example.com"));
        assert!(output.contains("outcome"));
        assert!(output.contains("limit reached"));
        assert!(output.contains("matched"));
    }

    #[test]
    fn test_run_json() {
        let output = Formatter::new(OutputFormat::Json).format_run(&make_summary());
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["matched"], 12);
        assert_eq!(value["outcome"]["kind"], "limit_reached");
        assert_eq!(value["price_phase"], "low");
    }

    #[test]
    fn test_run_csv_has_matching_columns() {
        let output = Formatter::new(OutputFormat::Csv).format_run(&make_summary());
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].split(',').count(), lines[1].split(',').count());
        assert!(lines[0].starts_with("supplier_key,outcome"));
    }

    #[test]
    fn test_status_table_lists_top_categories_and_errors() {
        let output = Formatter::new(OutputFormat::Table).format_status(&make_report());
        assert!(output.contains("Top categories:"));
        assert!(output.contains("https://shop.example.com/kitchen"));
        assert!(output.contains("Recent errors:"));
        assert!(output.contains("50/120"));
    }

    #[test]
    fn test_status_markdown() {
        let output = Formatter::new(OutputFormat::Markdown).format_status(&make_report());
        assert!(output.starts_with("## Status: shop.example.com"));
        assert!(output.contains("| price_phase | medium |"));
        assert!(output.contains("### Top categories"));
    }

    #[test]
    fn test_status_json_round_trips_state() {
        let output = Formatter::new(OutputFormat::Json).format_status(&make_report());
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["state"]["status"], "paused");
        assert_eq!(value["linked_products"], 12);
    }

    #[test]
    fn test_classification_formats() {
        let rows = classify_inputs(&["Garden, Tools", "perfume"]);

        let table = Formatter::new(OutputFormat::Table).format_classification(&rows);
        assert!(table.contains("friendly"));
        assert!(table.contains("avoid"));

        let csv = Formatter::new(OutputFormat::Csv).format_classification(&rows);
        assert!(csv.contains("\"Garden, Tools\",friendly"));

        let json = Formatter::new(OutputFormat::Json).format_classification(&rows);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[1]["classification"], "avoid");
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(Formatter::csv_escape("simple"), "simple");
        assert_eq!(Formatter::csv_escape("with,comma"), "\"with,comma\"");
        assert_eq!(Formatter::csv_escape("with\"quote"), "\"with\"\"quote\"");
    }
}

//! Output formatting for CLI

use data_normalization_sdk::models::{Row, display_text};
use data_normalization_sdk::pipeline::{RunReport, RunStatus};
use data_normalization_sdk::report::ReportOutcome;
use data_normalization_sdk::ReportSuggestion;

const MAX_CELL_WIDTH: usize = 40;

/// Render rows as an aligned text table
pub fn format_table(headers: &[String], rows: &[Row]) -> String {
    if headers.is_empty() {
        return "(no columns)\n".to_string();
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            headers
                .iter()
                .map(|h| truncate(&display_text(row.get(h))))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for line in &cells {
        for (i, cell) in line.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut output = String::new();
    output.push_str(&format_line(headers, &widths));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    output.push_str(&format_line(&rule, &widths));
    for line in &cells {
        output.push_str(&format_line(line, &widths));
    }
    output.push_str(&format!("({} row(s))\n", rows.len()));
    output
}

fn format_line(cells: &[String], widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect();
    format!("{}\n", padded.join(" | ").trim_end())
}

fn truncate(text: &str) -> String {
    let single_line = text.replace(['\n', '\r'], " ");
    if single_line.chars().count() <= MAX_CELL_WIDTH {
        return single_line;
    }
    let cut: String = single_line.chars().take(MAX_CELL_WIDTH - 1).collect();
    format!("{cut}…")
}

/// Human-readable run summary
pub fn format_run_report(report: &RunReport) -> String {
    let mut output = String::new();

    match report.status {
        RunStatus::Completed => output.push_str(&format!("✅ Ingested {}\n", report.source)),
        RunStatus::Failed => output.push_str(&format!("❌ Ingest of {} failed\n", report.source)),
        RunStatus::Running => {
            output.push_str(&format!("… Ingest of {} running\n", report.source))
        }
    }
    output.push_str(&format!("  Run: {}\n", report.run_id));
    output.push_str(&format!("  Rows parsed: {}\n", report.rows_parsed));
    if !report.table_order.is_empty() {
        output.push_str(&format!("  Table order: {}\n", report.table_order.join(" → ")));
    }
    if let Some(table) = &report.fallback_table {
        output.push_str(&format!("  Stored as single table: {table}\n"));
    }

    if !report.tables.is_empty() {
        output.push_str("\n  Tables:\n");
        for stats in &report.tables {
            output.push_str(&format!(
                "    {}: {} new, {} duplicate(s), {} already stored",
                stats.table, stats.unique_rows, stats.duplicates_dropped, stats.already_stored
            ));
            if stats.unresolved_foreign_keys > 0 {
                output.push_str(&format!(
                    ", ⚠️  {} unresolved foreign key(s)",
                    stats.unresolved_foreign_keys
                ));
            }
            output.push('\n');
        }
    }

    if let Some(error) = &report.error {
        output.push_str(&format!("\n  Error: {error}\n"));
    }
    output.push_str(&format!("  Duration: {} ms\n", report.duration_ms));
    output
}

/// A report result with its title and narrative
pub fn format_outcome(outcome: &ReportOutcome) -> String {
    let mut output = String::new();
    if !outcome.title.is_empty() {
        output.push_str(&format!("{}\n", outcome.title));
    }
    if !outcome.description.is_empty() {
        output.push_str(&format!("{}\n", outcome.description));
    }
    output.push('\n');
    output.push_str(&format_table(&outcome.result.headers, &outcome.result.rows));

    let chart = &outcome.result.chart;
    if !chart.labels.is_empty() {
        output.push_str(&format!(
            "\nChart ({}): {} point(s) for {}\n",
            String::from(chart.kind.clone()),
            chart.labels.len(),
            chart.label
        ));
    }
    if let Some(summary) = &outcome.summary {
        output.push_str(&format!("\nSummary:\n{summary}\n"));
    }
    output
}

/// Numbered list of suggested reports
pub fn format_suggestions(suggestions: &[ReportSuggestion]) -> String {
    if suggestions.is_empty() {
        return "No report suggestions.\n".to_string();
    }
    let mut output = String::new();
    for (idx, suggestion) in suggestions.iter().enumerate() {
        output.push_str(&format!("{}. {}\n", idx + 1, suggestion.title));
        if !suggestion.description.is_empty() {
            output.push_str(&format!("   {}\n", suggestion.description));
        }
        output.push_str(&format!(
            "   tables: {} | chart: {}\n",
            suggestion.query.tables.join(", "),
            String::from(suggestion.chart_kind.clone())
        ));
    }
    output
}

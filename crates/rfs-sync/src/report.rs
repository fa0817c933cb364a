//! Human-readable scan digests.

use std::fmt::Write as _;

use rfs_core::StoredEntry;

use crate::ScanRunSummary;

const RULE: &str = "================================================================================";

/// Console digest: counts, then the ranked findings.
pub fn render_digest(summary: &ScanRunSummary) -> String {
    let ingest = &summary.ingest;
    let mut out = String::new();

    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "RESEARCH FEED SCAN - {}", summary.batch_label.to_uppercase());
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Scan Date: {}", summary.started_at.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out, "Run ID: {}", summary.run_id);
    if let Some(collected_at) = summary.collected_at {
        let _ = writeln!(out, "Batch Collected: {}", collected_at.format("%Y-%m-%d %H:%M:%S"));
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Searches Completed: {}", ingest.searches_completed);
    let _ = writeln!(out, "Total Articles Found: {}", ingest.total_seen);
    let _ = writeln!(out, "New Articles Added: {}", ingest.newly_stored);
    let _ = writeln!(out, "Already Stored: {}", ingest.duplicates);
    let _ = writeln!(out, "Not Relevant: {}", ingest.discarded);
    let _ = writeln!(out, "Database Total: {} articles", summary.database_total);
    if ingest.has_failures() {
        let _ = writeln!(out, "Malformed Records: {}", ingest.malformed);
        let _ = writeln!(out, "Store Write Failures: {}", ingest.write_failures);
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "TOP FINDINGS (by relevance score):");
    let _ = writeln!(out, "{RULE}");

    if summary.top_findings.is_empty() {
        let _ = writeln!(out, "\n(no stored findings for these searches)");
    }
    out.push_str(&render_findings(&summary.top_findings));

    if !ingest.failures.is_empty() {
        let _ = writeln!(out, "\n{RULE}");
        let _ = writeln!(out, "FAILED RECORDS:");
        let _ = writeln!(out, "{RULE}");
        for failure in &ingest.failures {
            let _ = writeln!(
                out,
                "- [{:?}] {} ({}): {}",
                failure.kind,
                failure.url.as_deref().unwrap_or("<no url>"),
                failure.search_term,
                failure.message
            );
        }
    }

    let _ = writeln!(out, "\n{RULE}");
    let _ = writeln!(out, "Database: {}", summary.database);
    let _ = writeln!(out, "Table: {}", rfs_storage::FINDINGS_TABLE);
    if let Some(err) = &summary.report_error {
        let _ = writeln!(out, "Reports: not written ({err})");
    }
    let _ = write!(out, "{RULE}");
    out
}

/// Ranked entries, one block per finding, each preceded by a blank line.
pub fn render_findings(entries: &[StoredEntry]) -> String {
    let mut out = String::new();
    for (i, entry) in entries.iter().enumerate() {
        let _ = writeln!(out, "\n{}. [{} pts] {}", i + 1, entry.relevance_score, entry.record.title);
        let _ = writeln!(out, "   Search: {}", entry.record.search_term);
        if let Some(published) = &entry.record.published_date {
            let _ = writeln!(out, "   Published: {published}");
        }
        let _ = writeln!(out, "   URL: {}", entry.record.url);
    }
    out
}

/// Markdown brief stored next to the run summary.
pub fn render_markdown_brief(summary: &ScanRunSummary) -> String {
    let ingest = &summary.ingest;
    let mut lines = vec![
        format!("# Research Feed Scan: {}", summary.batch_label),
        String::new(),
        format!("- Run ID: `{}`", summary.run_id),
        format!("- Started: {}", summary.started_at),
        format!("- Finished: {}", summary.finished_at),
    ];
    if let Some(collected_at) = summary.collected_at {
        lines.push(format!("- Batch collected: {collected_at}"));
    }
    if let Some(sha) = &summary.batch_sha256 {
        lines.push(format!("- Batch sha256: `{sha}`"));
    }
    lines.push(format!("- Searches completed: {}", ingest.searches_completed));
    lines.push(format!("- Records seen: {}", ingest.total_seen));
    lines.push(format!("- Newly stored: {}", ingest.newly_stored));
    lines.push(format!("- Already stored: {}", ingest.duplicates));
    lines.push(format!("- Not relevant: {}", ingest.discarded));
    lines.push(format!("- Malformed: {}", ingest.malformed));
    lines.push(format!("- Store write failures: {}", ingest.write_failures));
    lines.push(format!("- Database total: {} articles", summary.database_total));
    lines.push(String::new());

    lines.push("## Search Terms".to_string());
    for (term, counts) in &ingest.per_term {
        lines.push(format!("- {term}: {} seen, {} stored", counts.seen, counts.stored));
    }
    lines.push(String::new());

    lines.push("## Top Findings".to_string());
    for (i, entry) in summary.top_findings.iter().enumerate() {
        let date = entry
            .record
            .published_date
            .as_deref()
            .map(|d| format!(" ({d})"))
            .unwrap_or_default();
        lines.push(format!(
            "{}. **[{} pts]** [{}]({}){date} _{}_",
            i + 1,
            entry.relevance_score,
            entry.record.title,
            entry.record.url,
            entry.record.search_term
        ));
    }
    lines.push(String::new());
    lines.join("\n")
}

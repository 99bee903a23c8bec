//! Markdown summary generation
//!
//! Renders an `IngestionSummary` snapshot as a human-readable report:
//! status breakdown, frontier size, dedup stats, top-ranked pages.

use crate::output::traits::{IngestionSummary, OutputResult};
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub fn generate_markdown_summary(
    summary: &IngestionSummary,
    output_path: &Path,
) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary);
    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;
    Ok(())
}

pub fn format_markdown_summary(summary: &IngestionSummary) -> String {
    let mut out = String::new();

    out.push_str("# Crawl Summary\n\n");

    if let Some(strategy) = summary.strategy {
        out.push_str(&format!("**Strategy:** {strategy:?}\n\n"));
    }

    out.push_str("## Frontier\n\n");
    out.push_str(&format!("- Jobs queued: {}\n", summary.frontier_size));
    out.push_str(&format!("- Jobs total (all statuses): {}\n\n", summary.total_jobs()));

    out.push_str("## Status breakdown\n\n");
    out.push_str("| Status | Count |\n|---|---|\n");
    let mut statuses: Vec<_> = summary.counts_by_status.iter().collect();
    statuses.sort_by_key(|(status, _)| status.to_string());
    for (status, count) in statuses {
        out.push_str(&format!("| {status} | {count} |\n"));
    }
    out.push('\n');

    if let Some(dedup) = &summary.dedup {
        out.push_str("## Deduplication\n\n");
        out.push_str(&format!(
            "- URLs seen (Bloom approximate count): {}\n",
            dedup.bloom_approximate_count
        ));
        out.push_str(&format!(
            "- Bloom expected false-positive rate: {:.4}\n\n",
            dedup.bloom_expected_fpr
        ));
    }

    if !summary.top_pages.is_empty() {
        out.push_str("## Top pages by PageRank\n\n");
        out.push_str("| URL | PageRank | Inbound links |\n|---|---|---|\n");
        for page in &summary.top_pages {
            out.push_str(&format!(
                "| {} | {:.6} | {} |\n",
                page.url, page.pagerank_score, page.inbound_links_count
            ));
        }
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_summary() -> IngestionSummary {
        let mut counts_by_status = HashMap::new();
        counts_by_status.insert("completed".to_string(), 42);
        counts_by_status.insert("pending".to_string(), 7);
        IngestionSummary {
            strategy: Some(crate::frontier::Strategy::Bfs),
            counts_by_status,
            frontier_size: 7,
            dedup: None,
            top_pages: vec![],
        }
    }

    #[test]
    fn test_format_includes_status_counts() {
        let markdown = format_markdown_summary(&sample_summary());
        assert!(markdown.contains("completed"));
        assert!(markdown.contains("42"));
    }

    #[test]
    fn test_format_includes_frontier_size() {
        let markdown = format_markdown_summary(&sample_summary());
        assert!(markdown.contains("Jobs queued: 7"));
    }

    #[test]
    fn test_generate_writes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("summary.md");
        generate_markdown_summary(&sample_summary(), &path).unwrap();
        assert!(path.exists());
    }
}

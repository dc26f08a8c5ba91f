//! Markdown summary generation
//!
//! This module generates human-readable markdown summaries of crawl results,
//! including counters, per-category totals, and failure reports.

use crate::output::manifest::Manifest;
use crate::output::stats::CrawlStatistics;
use crate::Result;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes a markdown summary of the manifest
///
/// # Arguments
///
/// * `manifest` - The run manifest
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(GatherError)` - Failed to write summary
pub fn generate_markdown_summary(manifest: &Manifest, output_path: &Path) -> Result<()> {
    let markdown = format_markdown_summary(manifest);

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a manifest as markdown
pub fn format_markdown_summary(manifest: &Manifest) -> String {
    let mut md = String::new();

    md.push_str("# Sumi-Gather Run Summary\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Seed**: {}\n", manifest.seed_url));
    md.push_str(&format!("- **Started**: {}\n", manifest.started_at.to_rfc3339()));
    if let Some(finished) = &manifest.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished.to_rfc3339()));
    }
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds\n",
        manifest.elapsed_seconds
    ));
    let status = if manifest.cancelled {
        "cancelled"
    } else {
        "completed"
    };
    md.push_str(&format!("- **Status**: {}\n", status));
    if let Some(hash) = &manifest.config_hash {
        md.push_str(&format!("- **Config Hash**: {}\n", hash));
    }
    md.push('\n');

    // Traversal
    md.push_str("## Traversal\n\n");
    md.push_str("| Counter | Count |\n");
    md.push_str("|---------|-------|\n");
    md.push_str(&format!("| Pages visited | {} |\n", manifest.pages_visited));
    md.push_str(&format!("| Pages enqueued | {} |\n", manifest.pages_enqueued));
    md.push_str(&format!(
        "| Pages at depth limit | {} |\n",
        manifest.pages_at_depth_limit
    ));
    md.push_str(&format!(
        "| Duplicates skipped | {} |\n",
        manifest.duplicates_skipped
    ));
    md.push_str(&format!(
        "| Discarded references | {} |\n",
        manifest.discarded_references
    ));
    md.push_str(&format!(
        "| Render escalations | {} |\n",
        manifest.render_escalations
    ));
    md.push_str(&format!(
        "| Unreachable pages | {} |\n\n",
        manifest.unreachable_pages.len()
    ));

    // Artifacts
    md.push_str("## Artifacts\n\n");
    md.push_str(&format!("- **Attempted**: {}\n", manifest.artifacts_attempted));
    md.push_str(&format!(
        "- **Succeeded**: {} ({} already present)\n",
        manifest.artifacts_succeeded, manifest.artifacts_reused
    ));
    md.push_str(&format!("- **Invalid**: {}\n", manifest.artifacts_invalid));
    md.push_str(&format!("- **Failed**: {}\n", manifest.artifacts_failed));
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n\n",
        manifest.success_rate()
    ));

    // Per-category breakdown
    let stats = CrawlStatistics::from_manifest(manifest);
    if !stats.by_category.is_empty() {
        md.push_str("## Categories\n\n");
        md.push_str("| Category | Success | Invalid | Failed | Bytes |\n");
        md.push_str("|----------|---------|---------|--------|-------|\n");
        for (category, counts) in &stats.by_category {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                category, counts.success, counts.invalid, counts.failed, counts.bytes
            ));
        }
        md.push('\n');
    }

    // Failed artifacts
    let failures: Vec<_> = manifest.failures().collect();
    if !failures.is_empty() {
        md.push_str("## Failed Artifacts\n\n");
        md.push_str("| URL | Status | Cause |\n");
        md.push_str("|-----|--------|-------|\n");
        for record in failures {
            let cause = record
                .cause
                .as_ref()
                .map(|c| c.to_string())
                .unwrap_or_default();
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                record.source_url,
                record.status.as_str(),
                cause
            ));
        }
        md.push('\n');
    }

    // Unreachable pages
    if !manifest.unreachable_pages.is_empty() {
        md.push_str("## Unreachable Pages\n\n");
        md.push_str("| URL | Depth | Cause |\n");
        md.push_str("|-----|-------|-------|\n");
        for note in &manifest.unreachable_pages {
            md.push_str(&format!("| {} | {} | {} |\n", note.url, note.depth, note.cause));
        }
        md.push('\n');
    }

    md
}

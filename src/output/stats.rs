//! Statistics generation from a run manifest
//!
//! This module provides functionality for extracting and displaying
//! run statistics from a manifest written by an earlier crawl.

use crate::output::manifest::{DownloadStatus, FailureCause, Manifest};
use crate::Result;
use std::collections::BTreeMap;
use std::path::Path;

/// Artifact totals for one category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryCounts {
    pub success: usize,
    pub invalid: usize,
    pub failed: usize,
    /// Bytes stored by successful downloads
    pub bytes: u64,
}

/// Run statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    pub manifest: Manifest,

    /// Artifact totals keyed by category, alphabetically
    pub by_category: BTreeMap<String, CategoryCounts>,

    /// Failure counts keyed by cause kind
    pub failure_kinds: BTreeMap<&'static str, usize>,
}

impl CrawlStatistics {
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let mut by_category: BTreeMap<String, CategoryCounts> = BTreeMap::new();
        let mut failure_kinds: BTreeMap<&'static str, usize> = BTreeMap::new();

        for record in &manifest.downloads {
            let counts = by_category.entry(record.category.clone()).or_default();
            match record.status {
                DownloadStatus::Success => {
                    counts.success += 1;
                    counts.bytes += record.byte_size;
                }
                DownloadStatus::Invalid => counts.invalid += 1,
                DownloadStatus::Failed => counts.failed += 1,
            }

            if let Some(cause) = &record.cause {
                let kind = match cause {
                    FailureCause::InvalidArtifact(_) => "invalid_artifact",
                    FailureCause::DownloadFailed(_) => "download_failed",
                    FailureCause::Filesystem(_) => "filesystem",
                };
                *failure_kinds.entry(kind).or_insert(0) += 1;
            }
        }

        Self {
            manifest: manifest.clone(),
            by_category,
            failure_kinds,
        }
    }
}

/// Loads statistics from a manifest file
///
/// # Arguments
///
/// * `path` - Path of the manifest JSON
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(GatherError)` - The manifest could not be read or parsed
pub fn load_statistics(path: &Path) -> Result<CrawlStatistics> {
    let manifest = Manifest::load(path)?;
    Ok(CrawlStatistics::from_manifest(&manifest))
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    let manifest = &stats.manifest;

    println!("=== Run Statistics ===\n");

    println!("Overview:");
    println!("  Seed: {}", manifest.seed_url);
    println!("  Started: {}", manifest.started_at.to_rfc3339());
    println!("  Elapsed: {:.1}s", manifest.elapsed_seconds);
    if manifest.cancelled {
        println!("  Status: cancelled (partial results)");
    }
    println!();

    println!("Traversal:");
    println!("  Pages visited: {}", manifest.pages_visited);
    println!("  Pages enqueued: {}", manifest.pages_enqueued);
    println!("  Pages at depth limit: {}", manifest.pages_at_depth_limit);
    println!("  Duplicates skipped: {}", manifest.duplicates_skipped);
    println!("  Discarded references: {}", manifest.discarded_references);
    println!("  Render escalations: {}", manifest.render_escalations);
    println!("  Unreachable pages: {}", manifest.unreachable_pages.len());
    println!();

    if !stats.by_category.is_empty() {
        println!("Artifacts by Category:");
        for (category, counts) in &stats.by_category {
            println!(
                "  {}: {} ok, {} invalid, {} failed ({} bytes)",
                category, counts.success, counts.invalid, counts.failed, counts.bytes
            );
        }
        println!();
    }

    if !stats.failure_kinds.is_empty() {
        println!("Failure Summary:");
        let mut kinds: Vec<_> = stats.failure_kinds.iter().collect();
        kinds.sort_by(|a, b| b.1.cmp(a.1));
        for (kind, count) in kinds {
            println!("  {}: {}", kind, count);
        }
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} artifacts stored, {} bytes)",
        manifest.success_rate(),
        manifest.artifacts_succeeded,
        manifest.artifacts_attempted,
        manifest.total_bytes()
    );
}

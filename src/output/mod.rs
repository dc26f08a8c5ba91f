//! Output module for run results
//!
//! This module handles:
//! - The JSON manifest recording every download and counter of a run
//! - Generating markdown summaries of run results
//! - Printing statistics from an existing manifest

mod manifest;
mod markdown;
pub mod stats;

pub use manifest::{DownloadRecord, DownloadStatus, FailureCause, Manifest, PageNote};
pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use stats::{load_statistics, print_statistics, CategoryCounts, CrawlStatistics};

//! Run manifest: the machine-readable result of a crawl
//!
//! The manifest holds the ordered download log, the page and artifact
//! counters and every page that could not be reached. It is written as
//! pretty-printed JSON inside the download root.

use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Final status of one artifact acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Stored and validated
    Success,
    /// Retrieved, but the content was not the expected artifact
    Invalid,
    /// Could not be retrieved or stored
    Failed,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Invalid => "invalid",
            Self::Failed => "failed",
        }
    }
}

/// Why an artifact is not a success
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FailureCause {
    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Filesystem error: {0}")]
    Filesystem(String),
}

/// Outcome of one artifact acquisition; never changed after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub source_url: String,
    pub local_path: PathBuf,
    pub byte_size: u64,
    pub status: DownloadStatus,
    pub category: String,

    /// Hex SHA-256 of the stored file; set only for `Success`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<FailureCause>,
}

impl DownloadRecord {
    pub fn success(
        url: &Url,
        local_path: PathBuf,
        category: &str,
        byte_size: u64,
        sha256: String,
    ) -> Self {
        Self {
            source_url: url.to_string(),
            local_path,
            byte_size,
            status: DownloadStatus::Success,
            category: category.to_string(),
            sha256: Some(sha256),
            cause: None,
        }
    }

    pub fn invalid(url: &Url, local_path: PathBuf, category: &str, cause: FailureCause) -> Self {
        Self {
            source_url: url.to_string(),
            local_path,
            byte_size: 0,
            status: DownloadStatus::Invalid,
            category: category.to_string(),
            sha256: None,
            cause: Some(cause),
        }
    }

    pub fn failed(url: &Url, local_path: PathBuf, category: &str, cause: FailureCause) -> Self {
        Self {
            source_url: url.to_string(),
            local_path,
            byte_size: 0,
            status: DownloadStatus::Failed,
            category: category.to_string(),
            sha256: None,
            cause: Some(cause),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == DownloadStatus::Success
    }
}

/// A page that could not be fetched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageNote {
    pub url: String,
    pub depth: u32,
    pub cause: String,
}

/// Result of one crawl run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub seed_url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: f64,

    /// SHA-256 of the configuration file, when one was used
    pub config_hash: Option<String>,

    /// True when the run stopped early on request
    pub cancelled: bool,

    // ===== Page counters =====
    /// Pages whose markup was fetched
    pub pages_visited: usize,
    /// Pages below the seed accepted into the frontier
    pub pages_enqueued: usize,
    /// Pages at the depth limit, recorded without fetching
    pub pages_at_depth_limit: usize,
    /// Targets dropped because their URL was already known
    pub duplicates_skipped: usize,
    /// References that could never be fetched (`javascript:` and similar)
    pub discarded_references: usize,
    /// Pages re-fetched with the rendered tier
    pub render_escalations: usize,

    // ===== Artifact counters =====
    pub artifacts_attempted: usize,
    pub artifacts_succeeded: usize,
    pub artifacts_invalid: usize,
    pub artifacts_failed: usize,
    /// Successes satisfied by a file from an earlier run
    pub artifacts_reused: usize,

    pub unreachable_pages: Vec<PageNote>,

    /// Download log in completion order
    pub downloads: Vec<DownloadRecord>,
}

impl Manifest {
    /// Creates an empty manifest for a run starting now
    pub fn new(seed_url: &Url, config_hash: Option<String>) -> Self {
        Self {
            seed_url: seed_url.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            elapsed_seconds: 0.0,
            config_hash,
            cancelled: false,
            pages_visited: 0,
            pages_enqueued: 0,
            pages_at_depth_limit: 0,
            duplicates_skipped: 0,
            discarded_references: 0,
            render_escalations: 0,
            artifacts_attempted: 0,
            artifacts_succeeded: 0,
            artifacts_invalid: 0,
            artifacts_failed: 0,
            artifacts_reused: 0,
            unreachable_pages: Vec::new(),
            downloads: Vec::new(),
        }
    }

    /// Appends a download record and updates the artifact counters
    pub fn record_download(&mut self, record: DownloadRecord) {
        self.artifacts_attempted += 1;
        match record.status {
            DownloadStatus::Success => self.artifacts_succeeded += 1,
            DownloadStatus::Invalid => self.artifacts_invalid += 1,
            DownloadStatus::Failed => self.artifacts_failed += 1,
        }
        self.downloads.push(record);
    }

    pub fn record_unreachable(&mut self, url: &Url, depth: u32, cause: impl ToString) {
        self.unreachable_pages.push(PageNote {
            url: url.to_string(),
            depth,
            cause: cause.to_string(),
        });
    }

    /// Stamps the finish time and elapsed duration
    pub fn finish(&mut self, cancelled: bool) {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.elapsed_seconds = (now - self.started_at).num_milliseconds().max(0) as f64 / 1000.0;
        self.cancelled = cancelled;
    }

    /// Percentage of attempted artifacts that succeeded
    pub fn success_rate(&self) -> f64 {
        if self.artifacts_attempted == 0 {
            0.0
        } else {
            self.artifacts_succeeded as f64 / self.artifacts_attempted as f64 * 100.0
        }
    }

    /// Records whose status is not `Success`
    pub fn failures(&self) -> impl Iterator<Item = &DownloadRecord> {
        self.downloads.iter().filter(|r| !r.is_success())
    }

    /// Total bytes of successfully stored artifacts
    pub fn total_bytes(&self) -> u64 {
        self.downloads
            .iter()
            .filter(|r| r.is_success())
            .map(|r| r.byte_size)
            .sum()
    }

    /// Writes the manifest as pretty-printed JSON
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reads a manifest written by [`Manifest::write`]
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

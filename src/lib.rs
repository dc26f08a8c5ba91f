//! Sumi-Gather: a polite artifact harvester
//!
//! This crate walks the link graph below a seed page to a bounded depth,
//! separates downloadable artifacts from navigable pages, and stores the
//! artifacts on disk with size and content checks. Pages that render their
//! links client-side are re-fetched through a headless browser.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod url;

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Sumi-Gather operations
///
/// Only fatal conditions surface here. Failures tied to a single page or
/// artifact are recorded in the manifest instead.
#[derive(Debug, Error)]
pub enum GatherError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Download root {path} is not writable: {source}")]
    RootNotWritable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::TargetState,
        to: state::TargetState,
    },

    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for Sumi-Gather operations
pub type Result<T> = std::result::Result<T, GatherError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{gather, Coordinator};
pub use output::{DownloadRecord, DownloadStatus, Manifest};
pub use state::TargetState;
pub use url::{classify, normalize_url, ArtifactRules, ResourceKind};

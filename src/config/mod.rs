//! Configuration module for Sumi-Gather
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use sumi_gather::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("gather.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.crawler.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ArtifactConfig, Config, CrawlerConfig, DownloadConfig, FetchConfig, OutputConfig,
};

// Re-export parser and validation functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{validate, validate_seed_url};

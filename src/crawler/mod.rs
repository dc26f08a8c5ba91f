//! Crawler module for traversal, fetching and downloading
//!
//! This module contains the core crawling logic, including:
//! - Link extraction from markup with several independent rules
//! - Tiered page fetching with escalation to a headless browser
//! - The shared breadth-first frontier
//! - Artifact downloads with integrity checks and retries
//! - Overall crawl coordination

mod coordinator;
mod download;
mod extractor;
mod fetcher;
mod frontier;

pub use coordinator::{gather, Coordinator};
pub use download::Downloader;
pub use extractor::{
    extract_links, resolve_links, Extraction, ExtractionRule, PageLinks, RawLink, ResolvedLink,
};
pub use fetcher::{
    build_http_client, FetchAdapter, FetchError, FetchTier, FetchedPage, PageFetcher,
    TieredFetcher,
};
pub use frontier::{CrawlTarget, Frontier, FrontierStats};

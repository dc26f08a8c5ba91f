//! Artifact download manager
//!
//! This module handles:
//! - Mapping an artifact URL to `<root>/<category>/<file name>`
//! - Giving two different URLs that map to one path distinct names
//! - Reusing files already present from an earlier run, but only for the
//!   URL that stored them
//! - Streaming bodies to a `.part` file, hashing on the fly, then renaming
//! - Rejecting error pages served in place of the artifact
//! - Retrying transient failures with a fixed backoff

use crate::config::DownloadConfig;
use crate::output::{DownloadRecord, DownloadStatus, FailureCause, Manifest};
use crate::url::{
    artifact_file_name, extension_of, is_markup_extension, link_key, sanitize_component,
};
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use url::Url;

/// Folder used when a category sanitizes to nothing
const FALLBACK_CATEGORY: &str = "uncategorized";

/// Number of leading bytes inspected for an HTML signature
const SNIFF_LEN: usize = 512;

/// Outcome of a single download attempt
#[derive(Debug)]
enum AttemptError {
    /// Worth trying again after the backoff
    Retryable(String),
    /// Final for this artifact
    Fatal(FailureCause),
}

/// A file that passed validation and was moved into place
#[derive(Debug)]
struct StoredFile {
    byte_size: u64,
    sha256: String,
}

/// Retrieves artifacts into the download root
pub struct Downloader {
    client: Client,
    config: DownloadConfig,
    /// Paths handed out during this run and the URL that owns each
    claimed: Mutex<HashMap<PathBuf, Url>>,
    /// Paths stored by the previous run and the URL that owns each
    previous: HashMap<PathBuf, Url>,
    reused: AtomicUsize,
}

impl Downloader {
    pub fn new(client: Client, config: DownloadConfig) -> Self {
        Self {
            client,
            config,
            claimed: Mutex::new(HashMap::new()),
            previous: HashMap::new(),
            reused: AtomicUsize::new(0),
        }
    }

    /// Remembers which URL stored each file of an earlier run
    ///
    /// A path owned by another URL is never handed out or reused, so the
    /// order in which artifacts are reached cannot swap their files.
    pub fn with_previous_run(mut self, manifest: &Manifest) -> Self {
        self.previous = manifest
            .downloads
            .iter()
            .filter(|record| record.status == DownloadStatus::Success)
            .filter_map(|record| {
                let owner = Url::parse(&record.source_url).ok()?;
                Some((record.local_path.clone(), link_key(&owner)))
            })
            .collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Number of artifacts satisfied by files already on disk
    pub fn reused_count(&self) -> usize {
        self.reused.load(Ordering::Relaxed)
    }

    /// Downloads one artifact and reports the outcome
    ///
    /// # Flow
    ///
    /// 1. Compute the target path and claim it for this URL
    /// 2. If the file already exists (stored by this URL, or by no recorded
    ///    URL), report it with its size and digest
    /// 3. Stream the body to `<path>.part` while hashing
    /// 4. Validate size and content type; invalid files are removed
    /// 5. Rename the `.part` file into place
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Connect error / timeout / body error | Retry after backoff |
    /// | HTTP 5xx, HTTP 429 | Retry after backoff |
    /// | Other non-2xx | Immediate → Failed |
    /// | Too small / HTML error page | Immediate → Invalid |
    /// | Filesystem error | Immediate → Failed |
    ///
    /// # Arguments
    ///
    /// * `url` - The artifact URL
    /// * `suggested_name` - Link text to name the file after
    /// * `category` - Storage folder below the root
    ///
    /// # Returns
    ///
    /// A record describing the stored file or the failure
    pub async fn acquire(&self, url: &Url, suggested_name: &str, category: &str) -> DownloadRecord {
        let folder = sanitize_component(category, self.config.max_filename_length)
            .unwrap_or_else(|| FALLBACK_CATEGORY.to_string());
        let ext = extension_of(url);
        let file_name = artifact_file_name(
            suggested_name,
            ext.as_deref(),
            self.config.max_filename_length,
        );
        let path = self.claim_path(self.config.root.join(&folder).join(file_name), url);

        if fs::try_exists(&path).await.unwrap_or(false) {
            return match digest_file(&path).await {
                Ok(stored) => {
                    tracing::info!("Already present, skipping: {}", path.display());
                    self.reused.fetch_add(1, Ordering::Relaxed);
                    DownloadRecord::success(url, path, category, stored.byte_size, stored.sha256)
                }
                Err(e) => DownloadRecord::failed(
                    url,
                    path,
                    category,
                    FailureCause::Filesystem(e.to_string()),
                ),
            };
        }

        let max_attempts = self.config.max_retries.saturating_add(1);
        let mut attempt = 1;
        loop {
            match self.attempt(url, &path, ext.as_deref()).await {
                Ok(stored) => {
                    tracing::info!(
                        "Downloaded {} ({} bytes) -> {}",
                        url,
                        stored.byte_size,
                        path.display()
                    );
                    return DownloadRecord::success(
                        url,
                        path,
                        category,
                        stored.byte_size,
                        stored.sha256,
                    );
                }
                Err(AttemptError::Retryable(reason)) if attempt < max_attempts => {
                    tracing::warn!(
                        "Download of {} failed (attempt {}/{}): {}",
                        url,
                        attempt,
                        max_attempts,
                        reason
                    );
                    attempt += 1;
                    tokio::time::sleep(self.config.retry_backoff()).await;
                }
                Err(AttemptError::Retryable(reason)) => {
                    tracing::warn!("Giving up on {}: {}", url, reason);
                    return DownloadRecord::failed(
                        url,
                        path,
                        category,
                        FailureCause::DownloadFailed(reason),
                    );
                }
                Err(AttemptError::Fatal(cause)) => {
                    tracing::warn!("Download of {} rejected: {}", url, cause);
                    return match cause {
                        FailureCause::InvalidArtifact(_) => {
                            DownloadRecord::invalid(url, path, category, cause)
                        }
                        _ => DownloadRecord::failed(url, path, category, cause),
                    };
                }
            }
        }
    }

    /// Reserves `preferred` for `url`, adding ` (n)` to the stem when another
    /// URL already owns it in this run or stored it in the previous one
    fn claim_path(&self, preferred: PathBuf, url: &Url) -> PathBuf {
        let key = link_key(url);
        let mut claimed = self.claimed.lock().unwrap_or_else(|e| e.into_inner());
        let mut candidate = preferred.clone();
        let mut n = 2;
        loop {
            let taken = match claimed.get(&candidate) {
                Some(owner) if *owner == key => return candidate,
                Some(_) => true,
                None => self
                    .previous
                    .get(&candidate)
                    .is_some_and(|owner| *owner != key),
            };
            if !taken {
                claimed.insert(candidate.clone(), key);
                return candidate;
            }
            candidate = numbered_path(&preferred, n);
            n += 1;
        }
    }

    async fn attempt(
        &self,
        url: &Url,
        path: &Path,
        ext: Option<&str>,
    ) -> Result<StoredFile, AttemptError> {
        let response = self
            .client
            .get(link_key(url))
            .timeout(self.config.timeout())
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptError::Retryable(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(AttemptError::Fatal(FailureCause::DownloadFailed(format!(
                "HTTP {}",
                status.as_u16()
            ))));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(filesystem)?;
        }

        let part = part_path(path);
        let mut file = fs::File::create(&part).await.map_err(filesystem)?;
        let mut hasher = Sha256::new();
        let mut byte_size: u64 = 0;
        let mut prefix: Vec<u8> = Vec::with_capacity(SNIFF_LEN);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    drop(file);
                    remove_quietly(&part).await;
                    return Err(classify_request_error(e));
                }
            };
            if prefix.len() < SNIFF_LEN {
                let take = (SNIFF_LEN - prefix.len()).min(chunk.len());
                prefix.extend_from_slice(&chunk[..take]);
            }
            hasher.update(&chunk);
            byte_size += chunk.len() as u64;
            if let Err(e) = file.write_all(&chunk).await {
                drop(file);
                remove_quietly(&part).await;
                return Err(filesystem(e));
            }
        }

        if let Err(e) = file.flush().await {
            drop(file);
            remove_quietly(&part).await;
            return Err(filesystem(e));
        }
        drop(file);

        if let Some(reason) = self.validate(byte_size, &content_type, &prefix, ext) {
            remove_quietly(&part).await;
            return Err(AttemptError::Fatal(FailureCause::InvalidArtifact(reason)));
        }

        if let Err(e) = fs::rename(&part, path).await {
            remove_quietly(&part).await;
            return Err(filesystem(e));
        }

        Ok(StoredFile {
            byte_size,
            sha256: hex::encode(hasher.finalize()),
        })
    }

    /// Returns why a downloaded body is not the expected artifact
    fn validate(
        &self,
        byte_size: u64,
        content_type: &str,
        prefix: &[u8],
        ext: Option<&str>,
    ) -> Option<String> {
        let expects_markup = ext.map_or(false, is_markup_extension);

        if !expects_markup && content_type.starts_with("text/html") {
            return Some(format!(
                "served as text/html ({} bytes), likely an error page",
                byte_size
            ));
        }

        if byte_size < self.config.min_artifact_bytes {
            return Some(format!(
                "only {} bytes, below the {} byte minimum",
                byte_size, self.config.min_artifact_bytes
            ));
        }

        if !expects_markup && looks_like_html(prefix) {
            return Some("body is an HTML document".to_string());
        }

        None
    }
}

fn classify_request_error(e: reqwest::Error) -> AttemptError {
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() || e.is_decode() {
        AttemptError::Retryable(e.to_string())
    } else {
        AttemptError::Fatal(FailureCause::DownloadFailed(e.to_string()))
    }
}

fn filesystem(e: std::io::Error) -> AttemptError {
    AttemptError::Fatal(FailureCause::Filesystem(e.to_string()))
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        tracing::debug!("Could not remove {}: {}", path.display(), e);
    }
}

/// `<path>.part`, next to the final file
fn part_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// `dir/stem (n).ext`
fn numbered_path(path: &Path, n: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{} ({}).{}", stem, n, ext.to_string_lossy()),
        None => format!("{} ({})", stem, n),
    };
    path.with_file_name(name)
}

/// Detects an HTML document by its first non-whitespace bytes
fn looks_like_html(prefix: &[u8]) -> bool {
    let text = String::from_utf8_lossy(prefix);
    let head = text.trim_start_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
    let head = head.get(..head.len().min(16)).unwrap_or("").to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// Size and SHA-256 of a file already on disk
async fn digest_file(path: &Path) -> std::io::Result<StoredFile> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut byte_size: u64 = 0;
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        byte_size += n as u64;
    }
    Ok(StoredFile {
        byte_size,
        sha256: hex::encode(hasher.finalize()),
    })
}

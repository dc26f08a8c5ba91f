use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Sumi-Gather
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Builds a configuration with every section at its defaults
    pub fn from_seed(seed_url: impl Into<String>) -> Self {
        Self {
            crawler: CrawlerConfig {
                seed_url: seed_url.into(),
                max_depth: default_max_depth(),
                max_workers: default_max_workers(),
                politeness_delay: default_politeness_delay(),
                seed_category: default_seed_category(),
            },
            fetch: FetchConfig::default(),
            download: DownloadConfig::default(),
            artifacts: ArtifactConfig::default(),
            output: OutputConfig::default(),
        }
    }

    /// Path of the manifest file inside the download root
    pub fn manifest_path(&self) -> PathBuf {
        self.download.root.join(&self.output.manifest_name)
    }
}

/// Traversal configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Page the crawl starts from
    #[serde(rename = "seed-url")]
    pub seed_url: String,

    /// Maximum depth at which pages are still expanded
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Number of concurrent workers
    #[serde(rename = "max-workers", default = "default_max_workers")]
    pub max_workers: u32,

    /// Minimum time between requests to the same origin (milliseconds)
    #[serde(rename = "politeness-delay", default = "default_politeness_delay")]
    pub politeness_delay: u64,

    /// Storage folder for artifacts linked directly from the seed page
    #[serde(rename = "seed-category", default = "default_seed_category")]
    pub seed_category: String,
}

impl CrawlerConfig {
    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay)
    }
}

/// Page fetch configuration for both tiers
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Static tier timeout (seconds)
    #[serde(rename = "static-timeout", default = "default_static_timeout")]
    pub static_timeout: u64,

    /// Whether pages without links are re-fetched through a browser
    #[serde(default = "default_true")]
    pub render: bool,

    /// Rendered tier timeout (seconds)
    #[serde(rename = "render-timeout", default = "default_render_timeout")]
    pub render_timeout: u64,

    /// Time scripts are given to settle before the DOM is read (milliseconds)
    #[serde(rename = "settle-interval", default = "default_settle_interval")]
    pub settle_interval: u64,

    /// Browser executable; autodetected when absent
    #[serde(rename = "chrome-path", default)]
    pub chrome_path: Option<PathBuf>,
}

impl FetchConfig {
    pub fn static_timeout(&self) -> Duration {
        Duration::from_secs(self.static_timeout)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout)
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            static_timeout: default_static_timeout(),
            render: true,
            render_timeout: default_render_timeout(),
            settle_interval: default_settle_interval(),
            chrome_path: None,
        }
    }
}

/// Download manager configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadConfig {
    /// Root directory; one subdirectory per category is created below it
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Files smaller than this are treated as error pages
    #[serde(rename = "min-artifact-bytes", default = "default_min_artifact_bytes")]
    pub min_artifact_bytes: u64,

    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed wait between retries (milliseconds)
    #[serde(rename = "retry-backoff", default = "default_retry_backoff")]
    pub retry_backoff: u64,

    /// Per-download timeout (seconds)
    #[serde(default = "default_download_timeout")]
    pub timeout: u64,

    #[serde(rename = "max-filename-length", default = "default_max_filename_length")]
    pub max_filename_length: usize,
}

impl DownloadConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            min_artifact_bytes: default_min_artifact_bytes(),
            max_retries: default_max_retries(),
            retry_backoff: default_retry_backoff(),
            timeout: default_download_timeout(),
            max_filename_length: default_max_filename_length(),
        }
    }
}

/// Artifact classification allowlist
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactConfig {
    /// File extensions (without the dot) that mark a URL as an artifact
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// File name of the JSON manifest, written inside the download root
    #[serde(rename = "manifest-name", default = "default_manifest_name")]
    pub manifest_name: String,

    /// Optional markdown summary
    #[serde(rename = "summary-path", default)]
    pub summary_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            manifest_name: default_manifest_name(),
            summary_path: None,
        }
    }
}

fn default_max_depth() -> u32 {
    3
}

fn default_max_workers() -> u32 {
    4
}

fn default_politeness_delay() -> u64 {
    1000
}

fn default_seed_category() -> String {
    "direct".to_string()
}

fn default_user_agent() -> String {
    format!("sumi-gather/{}", env!("CARGO_PKG_VERSION"))
}

fn default_static_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_render_timeout() -> u64 {
    60
}

fn default_settle_interval() -> u64 {
    3000
}

fn default_root() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_min_artifact_bytes() -> u64 {
    512
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    2000
}

fn default_download_timeout() -> u64 {
    120
}

fn default_max_filename_length() -> usize {
    100
}

fn default_extensions() -> Vec<String> {
    [
        "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "zip", "rar", "7z", "txt", "csv",
    ]
    .iter()
    .map(|ext| ext.to_string())
    .collect()
}

fn default_manifest_name() -> String {
    "manifest.json".to_string()
}

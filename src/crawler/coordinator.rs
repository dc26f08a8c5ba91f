//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the traversal that ties every component together:
//! - Checking the configuration and the download root before any request
//! - Seeding the frontier and running a bounded pool of workers
//! - Dispatching pages to the fetch adapter and artifacts to the downloader
//! - Depth accounting and category inheritance
//! - Per-origin pacing and cooperative cancellation
//! - Replacing workers that panic so the run still drains
//! - Writing the manifest and optional markdown summary

use crate::config::{validate, Config};
use crate::crawler::download::Downloader;
use crate::crawler::extractor::ResolvedLink;
use crate::crawler::fetcher::{build_http_client, FetchAdapter, PageFetcher, TieredFetcher};
use crate::crawler::frontier::{CrawlTarget, Frontier};
use crate::output::{generate_markdown_summary, Manifest};
use crate::state::{OriginPacer, TargetState};
use crate::url::{normalize_absolute, ArtifactRules, ResourceKind};
use crate::{GatherError, Result};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Name of the file written to prove the download root accepts writes
const ROOT_PROBE: &str = ".sumi-gather-probe";

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Config,
    seed: Url,
    config_hash: Option<String>,
    fetcher: Arc<dyn PageFetcher>,
}

/// State shared by all workers of one run
struct CrawlContext {
    frontier: Frontier,
    adapter: FetchAdapter,
    downloader: Downloader,
    pacer: OriginPacer,
    manifest: Mutex<Manifest>,
    max_depth: u32,
    seed_category: String,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// Every fatal condition is detected here, before any request is made.
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `fetcher` - Page fetcher used for both tiers
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(GatherError)` - Invalid configuration or unwritable download root
    pub fn new(config: Config, fetcher: Arc<dyn PageFetcher>) -> Result<Self> {
        validate(&config)?;
        let seed = normalize_absolute(&config.crawler.seed_url)?;
        ensure_root_writable(&config.download.root)?;

        Ok(Self {
            config,
            seed,
            config_hash: None,
            fetcher,
        })
    }

    /// Creates a coordinator backed by the production [`TieredFetcher`]
    pub fn from_config(config: Config) -> Result<Self> {
        let fetcher = TieredFetcher::new(&config.fetch)?;
        Self::new(config, Arc::new(fetcher))
    }

    /// Records the configuration file digest in the manifest
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn seed(&self) -> &Url {
        &self.seed
    }

    /// Runs the crawl to completion or cancellation
    ///
    /// 1. Loads the previous manifest, if any, so reruns keep file ownership
    /// 2. Seeds the frontier with the seed page at depth 0
    /// 3. Spawns `max-workers` workers sharing the frontier
    /// 4. Waits until the frontier drains or `cancel` fires
    /// 5. Writes the manifest and the optional markdown summary
    ///
    /// Per-page and per-artifact failures never abort the run; they are
    /// recorded in the returned manifest.
    ///
    /// # Arguments
    ///
    /// * `cancel` - Stops dispatching new targets when triggered; fetches and
    ///   downloads already under way finish or time out
    ///
    /// # Returns
    ///
    /// * `Ok(Manifest)` - The run result, partial if cancelled
    /// * `Err(GatherError)` - The manifest could not be written
    pub async fn run(self, cancel: CancellationToken) -> Result<Manifest> {
        let Self {
            config,
            seed,
            config_hash,
            fetcher,
        } = self;

        tracing::info!(
            "Starting crawl of {} (max depth {}, {} workers)",
            seed,
            config.crawler.max_depth,
            config.crawler.max_workers
        );

        let manifest_path = config.manifest_path();
        let client = build_http_client(&config.fetch)?;
        let mut downloader = Downloader::new(client, config.download.clone());
        if let Some(previous) = load_previous_run(&manifest_path) {
            downloader = downloader.with_previous_run(&previous);
        }

        let rules = ArtifactRules::from_config(&config.artifacts);
        let ctx = Arc::new(CrawlContext {
            frontier: Frontier::new(),
            adapter: FetchAdapter::new(Arc::clone(&fetcher), &config.fetch, rules),
            downloader,
            pacer: OriginPacer::new(config.crawler.politeness_delay()),
            manifest: Mutex::new(Manifest::new(&seed, config_hash)),
            max_depth: config.crawler.max_depth,
            seed_category: config.crawler.seed_category.clone(),
        });

        ctx.frontier
            .push(CrawlTarget::seed(seed, config.crawler.seed_category.clone()));

        let mut workers = JoinSet::new();
        let mut next_id = 0;
        for _ in 0..config.crawler.max_workers {
            spawn_worker(&mut workers, next_id, &ctx, &cancel);
            next_id += 1;
        }
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(()) => {}
                Err(e) if e.is_panic() && !cancel.is_cancelled() => {
                    tracing::error!("Worker panicked, starting worker {}: {}", next_id, e);
                    spawn_worker(&mut workers, next_id, &ctx, &cancel);
                    next_id += 1;
                }
                Err(e) => tracing::error!("Worker task ended abnormally: {}", e),
            }
        }

        let mut manifest = ctx.lock_manifest().clone();
        manifest.duplicates_skipped = ctx.frontier.stats().duplicates;
        manifest.artifacts_reused = ctx.downloader.reused_count();
        manifest.finish(cancel.is_cancelled());

        fetcher.shutdown().await;

        manifest.write(&manifest_path)?;
        tracing::info!("Manifest written to {}", manifest_path.display());

        if let Some(summary_path) = &config.output.summary_path {
            generate_markdown_summary(&manifest, summary_path)?;
            tracing::info!("Summary written to {}", summary_path.display());
        }

        if manifest.cancelled {
            tracing::warn!("Crawl cancelled; manifest holds partial results");
        }
        tracing::info!(
            "Crawl completed: {} pages visited, {}/{} artifacts stored in {:.1}s",
            manifest.pages_visited,
            manifest.artifacts_succeeded,
            manifest.artifacts_attempted,
            manifest.elapsed_seconds
        );

        Ok(manifest)
    }
}

fn spawn_worker(
    workers: &mut JoinSet<()>,
    id: u32,
    ctx: &Arc<CrawlContext>,
    cancel: &CancellationToken,
) {
    let ctx = Arc::clone(ctx);
    let cancel = cancel.clone();
    workers.spawn(async move { worker(id, ctx, cancel).await });
}

/// Pulls targets until the frontier is exhausted or the run is cancelled
async fn worker(id: u32, ctx: Arc<CrawlContext>, cancel: CancellationToken) {
    tracing::debug!("Worker {} started", id);

    while let Some(target) = ctx.frontier.next(&cancel).await {
        // Released on unwind too, so a panic cannot stall the other workers
        let _done = ctx.frontier.completion_guard();
        let url = target.url.clone();
        match ctx.process(target, &cancel).await {
            Ok(state) => tracing::trace!("{} -> {}", url, state),
            Err(e) => tracing::error!("Error processing {}: {}", url, e),
        }
    }

    tracing::debug!("Worker {} finished", id);
}

/// Reads the manifest left by an earlier run into the same root
///
/// A missing manifest is normal; an unreadable one is logged and ignored.
fn load_previous_run(path: &Path) -> Option<Manifest> {
    if !path.exists() {
        return None;
    }
    match Manifest::load(path) {
        Ok(manifest) => {
            tracing::debug!(
                "Previous run stored {} records in {}",
                manifest.downloads.len(),
                path.display()
            );
            Some(manifest)
        }
        Err(e) => {
            tracing::warn!("Ignoring unreadable manifest {}: {}", path.display(), e);
            None
        }
    }
}

impl CrawlContext {
    fn lock_manifest(&self) -> MutexGuard<'_, Manifest> {
        self.manifest.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drives one target from `Pending` to a terminal state
    ///
    /// Returns the state the target was left in. A target cancelled while
    /// waiting for its pacing slot stays dispatched; once its request has
    /// started it runs to completion.
    async fn process(&self, target: CrawlTarget, cancel: &CancellationToken) -> Result<TargetState> {
        let state = TargetState::Pending;
        match target.kind {
            ResourceKind::Artifact => {
                let state = state.transition(TargetState::DispatchedAsArtifact)?;
                self.process_artifact(target, state, cancel).await
            }
            ResourceKind::Page => {
                let state = state.transition(TargetState::DispatchedAsPage)?;
                self.process_page(target, state, cancel).await
            }
        }
    }

    async fn process_artifact(
        &self,
        target: CrawlTarget,
        state: TargetState,
        cancel: &CancellationToken,
    ) -> Result<TargetState> {
        tokio::select! {
            _ = self.pacer.wait(&target.url) => {}
            _ = cancel.cancelled() => {
                tracing::debug!("Cancelled before downloading {}", target.url);
                return Ok(state);
            }
        }

        let record = self
            .downloader
            .acquire(&target.url, &target.label, &target.category)
            .await;

        let next = if record.is_success() {
            tracing::info!(
                "Stored {} ({} bytes)",
                record.local_path.display(),
                record.byte_size
            );
            TargetState::Completed
        } else {
            if let Some(cause) = &record.cause {
                tracing::warn!("Artifact {} not stored: {}", target.url, cause);
            }
            TargetState::Failed
        };

        self.lock_manifest().record_download(record);
        state.transition(next)
    }

    async fn process_page(
        &self,
        target: CrawlTarget,
        state: TargetState,
        cancel: &CancellationToken,
    ) -> Result<TargetState> {
        if target.depth >= self.max_depth {
            tracing::debug!("Depth limit reached at {}, not fetching", target.url);
            self.lock_manifest().pages_at_depth_limit += 1;
            return state.transition(TargetState::Completed);
        }

        tokio::select! {
            _ = self.pacer.wait(&target.url) => {}
            _ = cancel.cancelled() => {
                tracing::debug!("Cancelled before fetching {}", target.url);
                return Ok(state);
            }
        }

        let page = match self.adapter.fetch_page(&target.url).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("Page {} unreachable: {}", target.url, e);
                self.lock_manifest()
                    .record_unreachable(&target.url, target.depth, &e);
                return state.transition(TargetState::Failed);
            }
        };

        tracing::debug!(
            "{} links on {} via {} tier",
            page.links.len(),
            target.url,
            page.tier
        );

        let mut enqueued = 0;
        for link in &page.links.links {
            let child = CrawlTarget {
                url: link.url.clone(),
                label: link.label.clone(),
                depth: target.depth + 1,
                category: self.child_category(&target, link),
                kind: link.kind,
            };
            if self.frontier.push(child) && link.kind == ResourceKind::Page {
                enqueued += 1;
            }
        }

        let visited = {
            let mut manifest = self.lock_manifest();
            manifest.pages_visited += 1;
            manifest.pages_enqueued += enqueued;
            manifest.discarded_references += page.links.discarded;
            if page.escalated {
                manifest.render_escalations += 1;
            }
            manifest.pages_visited
        };

        if visited % 10 == 0 {
            let stats = self.frontier.stats();
            tracing::info!(
                "Progress: {} pages visited, {} queued, {} in flight",
                visited,
                stats.pending,
                stats.in_flight
            );
        }

        state.transition(TargetState::Completed)
    }

    /// Category for a link found on `parent`
    ///
    /// Pages linked from the seed name a new category after their label.
    /// Artifacts linked from the seed use the seed category. Everything
    /// deeper inherits its parent's category.
    fn child_category(&self, parent: &CrawlTarget, link: &ResolvedLink) -> String {
        if parent.depth > 0 {
            return parent.category.clone();
        }
        match link.kind {
            ResourceKind::Page => link.label.clone(),
            ResourceKind::Artifact => self.seed_category.clone(),
        }
    }
}

/// Creates the download root and proves a file can be written in it
fn ensure_root_writable(root: &Path) -> Result<()> {
    let not_writable = |source: std::io::Error| GatherError::RootNotWritable {
        path: root.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(root).map_err(not_writable)?;
    let probe = root.join(ROOT_PROBE);
    std::fs::write(&probe, b"").map_err(not_writable)?;
    std::fs::remove_file(&probe).map_err(not_writable)?;
    Ok(())
}

/// Runs a complete crawl with the production fetcher
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(Manifest)` - Crawl finished
/// * `Err(GatherError)` - A fatal error stopped the crawl
///
/// # Example
///
/// ```no_run
/// use sumi_gather::config::Config;
/// use sumi_gather::crawler::gather;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let manifest = gather(Config::from_seed("https://example.com/notices")).await?;
/// println!("{} artifacts stored", manifest.artifacts_succeeded);
/// # Ok(())
/// # }
/// ```
pub async fn gather(config: Config) -> Result<Manifest> {
    Coordinator::from_config(config)?
        .run(CancellationToken::new())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::fetcher::{FetchError, FetchTier};
    use crate::url::link_key;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Serves canned markup by URL and counts fetches
    #[derive(Default)]
    struct SiteFetcher {
        pages: HashMap<String, String>,
        crashes: HashSet<String>,
        fetches: Mutex<Vec<String>>,
        shutdowns: AtomicUsize,
    }

    impl SiteFetcher {
        fn with_page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), html.to_string());
            self
        }

        /// Makes fetching `url` panic
        fn with_crash(mut self, url: &str) -> Self {
            self.crashes.insert(url.to_string());
            self
        }

        fn fetched(&self) -> Vec<String> {
            self.fetches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for SiteFetcher {
        async fn fetch(
            &self,
            url: &Url,
            _tier: FetchTier,
            _timeout: Duration,
        ) -> std::result::Result<String, FetchError> {
            let key = link_key(url);
            self.fetches.lock().unwrap().push(key.to_string());
            if self.crashes.contains(key.as_str()) {
                panic!("renderer crashed on {}", key);
            }
            self.pages
                .get(key.as_str())
                .cloned()
                .ok_or(FetchError::Status(404))
        }

        async fn shutdown(&self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn create_test_config(root: &Path, max_depth: u32) -> Config {
        let mut config = Config::from_seed("https://example.com/");
        config.crawler.max_depth = max_depth;
        config.crawler.politeness_delay = 0;
        config.fetch.render = false;
        config.download.root = root.to_path_buf();
        config
    }

    fn link_page(hrefs: &[(&str, &str)]) -> String {
        let anchors: String = hrefs
            .iter()
            .map(|(href, text)| format!(r#"<a href="{}">{}</a>"#, href, text))
            .collect();
        format!("<html><body>{}</body></html>", anchors)
    }

    #[test]
    fn test_invalid_seed_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = create_test_config(dir.path(), 2);
        config.crawler.seed_url = "ftp://example.com/".to_string();

        let result = Coordinator::new(config, Arc::new(SiteFetcher::default()));
        assert!(matches!(result, Err(GatherError::Config(_))));
    }

    #[test]
    fn test_unwritable_root_rejected() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        let config = create_test_config(&file.join("downloads"), 2);

        let result = Coordinator::new(config, Arc::new(SiteFetcher::default()));
        assert!(matches!(result, Err(GatherError::RootNotWritable { .. })));
    }

    #[tokio::test]
    async fn test_depth_limit_stops_fetching() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(
            SiteFetcher::default()
                .with_page("https://example.com/", &link_page(&[("/a", "Level One")]))
                .with_page("https://example.com/a", &link_page(&[("/b", "Level Two")]))
                .with_page("https://example.com/b", &link_page(&[("/c", "Level Three")])),
        );

        let coordinator =
            Coordinator::new(create_test_config(dir.path(), 1), fetcher.clone()).unwrap();
        let manifest = coordinator.run(CancellationToken::new()).await.unwrap();

        assert_eq!(fetcher.fetched(), vec!["https://example.com/".to_string()]);
        assert_eq!(manifest.pages_visited, 1);
        assert_eq!(manifest.pages_enqueued, 1);
        assert_eq!(manifest.pages_at_depth_limit, 1);
        assert!(!manifest.cancelled);
    }

    #[tokio::test]
    async fn test_cycles_are_visited_once() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(
            SiteFetcher::default()
                .with_page(
                    "https://example.com/",
                    &link_page(&[("/a", "A"), ("/b", "B"), ("/a#top", "A again")]),
                )
                .with_page("https://example.com/a", &link_page(&[("/b", "B"), ("/", "Home")]))
                .with_page("https://example.com/b", &link_page(&[("/a", "A")])),
        );

        let mut config = create_test_config(dir.path(), 5);
        config.crawler.max_workers = 3;
        let manifest = Coordinator::new(config, fetcher.clone())
            .unwrap()
            .run(CancellationToken::new())
            .await
            .unwrap();

        let mut fetched = fetcher.fetched();
        fetched.sort();
        assert_eq!(
            fetched,
            vec![
                "https://example.com/".to_string(),
                "https://example.com/a".to_string(),
                "https://example.com/b".to_string(),
            ]
        );
        assert_eq!(manifest.pages_visited, 3);
        assert_eq!(manifest.pages_enqueued, 2);
        assert_eq!(manifest.duplicates_skipped, 3);
    }

    #[tokio::test]
    async fn test_unreachable_page_recorded() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(
            SiteFetcher::default()
                .with_page("https://example.com/", &link_page(&[("/missing", "Gone")])),
        );

        let manifest = Coordinator::new(create_test_config(dir.path(), 3), fetcher)
            .unwrap()
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(manifest.pages_visited, 1);
        assert_eq!(manifest.unreachable_pages.len(), 1);
        assert_eq!(manifest.unreachable_pages[0].url, "https://example.com/missing");
        assert_eq!(manifest.unreachable_pages[0].depth, 1);
    }

    #[tokio::test]
    async fn test_manifest_written_and_fetcher_shut_down() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(
            SiteFetcher::default().with_page("https://example.com/", &link_page(&[])),
        );

        let mut config = create_test_config(dir.path(), 2);
        config.output.summary_path = Some(dir.path().join("summary.md"));
        let manifest = Coordinator::new(config, fetcher.clone())
            .unwrap()
            .with_config_hash("abc")
            .run(CancellationToken::new())
            .await
            .unwrap();

        let written = Manifest::load(&dir.path().join("manifest.json")).unwrap();
        assert_eq!(written.pages_visited, manifest.pages_visited);
        assert_eq!(written.config_hash.as_deref(), Some("abc"));
        assert!(dir.path().join("summary.md").exists());
        assert_eq!(fetcher.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(
            SiteFetcher::default().with_page("https://example.com/", &link_page(&[("/a", "A")])),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let manifest = Coordinator::new(create_test_config(dir.path(), 3), fetcher.clone())
            .unwrap()
            .run(cancel)
            .await
            .unwrap();

        assert!(manifest.cancelled);
        assert_eq!(manifest.pages_visited, 0);
        assert!(fetcher.fetched().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_worker_does_not_stall_run() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(
            SiteFetcher::default()
                .with_page(
                    "https://example.com/",
                    &link_page(&[("/boom", "Boom"), ("/ok", "Fine")]),
                )
                .with_page("https://example.com/ok", &link_page(&[]))
                .with_crash("https://example.com/boom"),
        );

        let mut config = create_test_config(dir.path(), 3);
        config.crawler.max_workers = 1;
        let run = Coordinator::new(config, fetcher.clone())
            .unwrap()
            .run(CancellationToken::new());
        let manifest = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("run stalled after a worker panic")
            .unwrap();

        assert!(fetcher
            .fetched()
            .contains(&"https://example.com/ok".to_string()));
        assert_eq!(manifest.pages_visited, 2);
        assert!(!manifest.cancelled);
        assert!(dir.path().join("manifest.json").exists());
    }

    #[test]
    fn test_unreadable_previous_manifest_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        assert!(load_previous_run(&path).is_none());

        std::fs::write(&path, b"{ not json").unwrap();
        assert!(load_previous_run(&path).is_none());
    }

    #[test]
    fn test_child_category() {
        let ctx_category = |parent_depth: u32, parent_category: &str, kind: ResourceKind| {
            let parent = CrawlTarget {
                url: Url::parse("https://example.com/").unwrap(),
                label: String::new(),
                depth: parent_depth,
                category: parent_category.to_string(),
                kind: ResourceKind::Page,
            };
            let link = ResolvedLink {
                url: Url::parse("https://example.com/x").unwrap(),
                label: "Exam Notices".to_string(),
                kind,
                rule: crate::crawler::extractor::ExtractionRule::Anchor,
            };
            let client = reqwest::Client::new();
            let config = Config::from_seed("https://example.com/");
            let ctx = CrawlContext {
                frontier: Frontier::new(),
                adapter: FetchAdapter::new(
                    Arc::new(SiteFetcher::default()),
                    &config.fetch,
                    ArtifactRules::default(),
                ),
                downloader: Downloader::new(client, config.download.clone()),
                pacer: OriginPacer::new(Duration::ZERO),
                manifest: Mutex::new(Manifest::new(&parent.url, None)),
                max_depth: 3,
                seed_category: "direct".to_string(),
            };
            ctx.child_category(&parent, &link)
        };

        assert_eq!(ctx_category(0, "direct", ResourceKind::Page), "Exam Notices");
        assert_eq!(ctx_category(0, "direct", ResourceKind::Artifact), "direct");
        assert_eq!(ctx_category(1, "Results", ResourceKind::Page), "Results");
        assert_eq!(ctx_category(2, "Results", ResourceKind::Artifact), "Results");
    }
}

//! Page fetching in two tiers
//!
//! This module handles all page requests for the crawler, including:
//! - Building the HTTP client with the configured user agent
//! - The static tier: a plain GET returning the served markup
//! - The rendered tier: a shared headless Chromium that executes scripts
//!   and returns the resulting DOM
//! - The escalation policy that re-fetches link-less pages through the
//!   rendered tier exactly once

use crate::config::FetchConfig;
use crate::crawler::extractor::{extract_links, resolve_links, PageLinks};
use crate::url::{link_key, ArtifactRules};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use reqwest::Client;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

/// How a page is fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchTier {
    /// Plain HTTP GET, no script execution
    Static,
    /// Headless browser, scripts executed, DOM serialized
    Rendered,
}

impl fmt::Display for FetchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => write!(f, "static"),
            Self::Rendered => write!(f, "rendered"),
        }
    }
}

/// Errors raised by either fetch tier
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Renderer unavailable: {0}")]
    RenderUnavailable(String),

    #[error("Render failed: {0}")]
    Render(String),
}

/// Capability to fetch the markup of a page
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `url` with the given tier, giving up after `timeout`
    async fn fetch(&self, url: &Url, tier: FetchTier, timeout: Duration)
        -> Result<String, FetchError>;

    /// Releases resources held by the fetcher
    async fn shutdown(&self) {}
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The fetch configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use sumi_gather::config::FetchConfig;
/// use sumi_gather::crawler::build_http_client;
///
/// let client = build_http_client(&FetchConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &FetchConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

fn classify_reqwest_error(e: reqwest::Error, timeout: Duration) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(timeout)
    } else if let Some(status) = e.status() {
        FetchError::Status(status.as_u16())
    } else {
        FetchError::Network(e.to_string())
    }
}

enum RendererSlot {
    NotStarted,
    Running(Browser),
    Unavailable(String),
}

/// Production fetcher: `reqwest` for the static tier, `chromiumoxide` for
/// the rendered tier
///
/// The browser is launched on the first rendered fetch and shared by every
/// worker. A failed launch is remembered so later renders fail fast.
pub struct TieredFetcher {
    client: Client,
    chrome_path: Option<PathBuf>,
    settle_interval: Duration,
    renderer: Mutex<RendererSlot>,
}

impl TieredFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(build_http_client(config)?, config))
    }

    pub fn with_client(client: Client, config: &FetchConfig) -> Self {
        Self {
            client,
            chrome_path: config.chrome_path.clone(),
            settle_interval: config.settle_interval(),
            renderer: Mutex::new(RendererSlot::NotStarted),
        }
    }

    async fn fetch_static(&self, url: &Url, timeout: Duration) -> Result<String, FetchError> {
        let response = self
            .client
            .get(link_key(url))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(e, timeout))
    }

    async fn launch_browser(&self) -> Result<Browser, FetchError> {
        let mut builder = BrowserConfig::builder()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");
        if let Some(path) = &self.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(FetchError::RenderUnavailable)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::RenderUnavailable(e.to_string()))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!("Browser handler event error: {}", e);
                }
            }
        });

        tracing::info!("Launched headless browser for rendered fetches");
        Ok(browser)
    }

    async fn fetch_rendered(&self, url: &Url, timeout: Duration) -> Result<String, FetchError> {
        let page = {
            let mut slot = self.renderer.lock().await;
            if let RendererSlot::NotStarted = *slot {
                *slot = match self.launch_browser().await {
                    Ok(browser) => RendererSlot::Running(browser),
                    Err(e) => {
                        tracing::warn!("{}", e);
                        RendererSlot::Unavailable(e.to_string())
                    }
                };
            }
            match &*slot {
                RendererSlot::Running(browser) => browser
                    .new_page("about:blank")
                    .await
                    .map_err(|e| FetchError::Render(e.to_string()))?,
                RendererSlot::Unavailable(reason) => {
                    return Err(FetchError::RenderUnavailable(reason.clone()))
                }
                RendererSlot::NotStarted => {
                    return Err(FetchError::RenderUnavailable(
                        "browser not started".to_string(),
                    ))
                }
            }
        };

        let result = tokio::time::timeout(timeout, async {
            page.goto(url.as_str())
                .await
                .map_err(|e| FetchError::Render(e.to_string()))?;
            tokio::time::sleep(self.settle_interval).await;
            page.evaluate("document.documentElement.outerHTML")
                .await
                .map_err(|e| FetchError::Render(e.to_string()))?
                .into_value::<String>()
                .map_err(|e| FetchError::Render(e.to_string()))
        })
        .await;

        if let Err(e) = page.close().await {
            tracing::debug!("Failed to close tab for {}: {}", url, e);
        }

        result.unwrap_or(Err(FetchError::Timeout(timeout)))
    }
}

#[async_trait]
impl PageFetcher for TieredFetcher {
    async fn fetch(
        &self,
        url: &Url,
        tier: FetchTier,
        timeout: Duration,
    ) -> Result<String, FetchError> {
        match tier {
            FetchTier::Static => self.fetch_static(url, timeout).await,
            FetchTier::Rendered => self.fetch_rendered(url, timeout).await,
        }
    }

    async fn shutdown(&self) {
        let mut slot = self.renderer.lock().await;
        if let RendererSlot::Running(browser) = &mut *slot {
            if let Err(e) = browser.close().await {
                tracing::debug!("Failed to close browser: {}", e);
            }
            let _ = browser.wait().await;
        }
        *slot = RendererSlot::NotStarted;
    }
}

/// Links found on a page and how they were obtained
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub links: PageLinks,

    /// Tier whose markup produced `links`
    pub tier: FetchTier,

    /// Whether the rendered tier was invoked
    pub escalated: bool,

    /// Why the rendered tier failed, when the static result had to stand
    pub render_failure: Option<FetchError>,
}

/// Applies the escalation policy on top of a [`PageFetcher`]
#[derive(Clone)]
pub struct FetchAdapter {
    fetcher: Arc<dyn PageFetcher>,
    rules: ArtifactRules,
    render: bool,
    static_timeout: Duration,
    render_timeout: Duration,
}

impl FetchAdapter {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: &FetchConfig, rules: ArtifactRules) -> Self {
        Self {
            fetcher,
            rules,
            render: config.render,
            static_timeout: config.static_timeout(),
            render_timeout: config.render_timeout(),
        }
    }

    pub fn fetcher(&self) -> &Arc<dyn PageFetcher> {
        &self.fetcher
    }

    /// Fetches a page and returns its classified links
    ///
    /// # Escalation
    ///
    /// 1. Fetch with the static tier and extract links
    /// 2. If that yields zero links and rendering is enabled, fetch once with
    ///    the rendered tier and extract again
    ///
    /// A failed static fetch is returned as an error. A failed render after
    /// a successful static fetch keeps the (empty) static result.
    ///
    /// # Arguments
    ///
    /// * `url` - The page to fetch
    ///
    /// # Returns
    ///
    /// * `Ok(FetchedPage)` - Links and the tier that produced them
    /// * `Err(FetchError)` - The page could not be fetched
    pub async fn fetch_page(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let markup = self
            .fetcher
            .fetch(url, FetchTier::Static, self.static_timeout)
            .await?;
        let links = resolve_links(extract_links(&markup), url, &self.rules);

        if !links.is_empty() || !self.render {
            return Ok(FetchedPage {
                links,
                tier: FetchTier::Static,
                escalated: false,
                render_failure: None,
            });
        }

        tracing::debug!("No links in static markup of {}, rendering", url);

        match self
            .fetcher
            .fetch(url, FetchTier::Rendered, self.render_timeout)
            .await
        {
            Ok(markup) => Ok(FetchedPage {
                links: resolve_links(extract_links(&markup), url, &self.rules),
                tier: FetchTier::Rendered,
                escalated: true,
                render_failure: None,
            }),
            Err(e) => {
                tracing::warn!("Rendered fetch of {} failed: {}", url, e);
                Ok(FetchedPage {
                    links,
                    tier: FetchTier::Static,
                    escalated: true,
                    render_failure: Some(e),
                })
            }
        }
    }
}

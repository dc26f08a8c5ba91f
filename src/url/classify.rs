use crate::config::ArtifactConfig;
use std::collections::HashSet;
use url::Url;

/// What a discovered URL is expected to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A downloadable file
    Artifact,
    /// A navigable page that may contain more links
    Page,
}

/// Extension allowlist deciding which URLs are artifacts
///
/// Matching is case-insensitive and looks only at the last path segment, so
/// query strings and fragments never affect the result.
#[derive(Debug, Clone)]
pub struct ArtifactRules {
    extensions: HashSet<String>,
}

impl ArtifactRules {
    /// Creates rules from a list of extensions, with or without leading dots
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { extensions }
    }

    pub fn from_config(config: &ArtifactConfig) -> Self {
        Self::new(&config.extensions)
    }

    /// Returns true if the extension (without the dot) is on the allowlist
    pub fn is_artifact_extension(&self, ext: &str) -> bool {
        self.extensions.contains(&ext.to_lowercase())
    }
}

impl Default for ArtifactRules {
    fn default() -> Self {
        Self::from_config(&ArtifactConfig::default())
    }
}

/// Classifies a URL as an artifact or a page by its path extension
///
/// # Examples
///
/// ```
/// use sumi_gather::url::{classify, ArtifactRules, ResourceKind};
/// use url::Url;
///
/// let rules = ArtifactRules::default();
/// let pdf = Url::parse("https://x.org/a.pdf?x=1").unwrap();
/// let page = Url::parse("https://x.org/a").unwrap();
/// assert_eq!(classify(&pdf, &rules), ResourceKind::Artifact);
/// assert_eq!(classify(&page, &rules), ResourceKind::Page);
/// ```
pub fn classify(url: &Url, rules: &ArtifactRules) -> ResourceKind {
    match extension_of(url) {
        Some(ext) if rules.is_artifact_extension(&ext) => ResourceKind::Artifact,
        _ => ResourceKind::Page,
    }
}

/// Returns the lowercased extension of the URL's last path segment
pub fn extension_of(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.last()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Returns true for extensions a server legitimately answers with HTML
pub fn is_markup_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "html" | "htm" | "xhtml" | "shtml"
    )
}

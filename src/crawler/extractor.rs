//! Link extraction from page markup
//!
//! Candidate links are collected by several independent rules and then
//! resolved into absolute, deduplicated, classified links:
//! - `<a href>` anchors
//! - inline script handlers that redirect (`onclick="location.href='...'"`)
//! - `data-href`/`data-url`/`data-link`/`data-download` markers
//!
//! References that can never be fetched (`javascript:`, `mailto:`, `tel:`,
//! `data:` and empty hrefs) are dropped and counted.

use crate::url::{
    classify, collapse_whitespace, link_key, normalize_url, placeholder_label, ArtifactRules,
    ResourceKind,
};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

/// The heuristic that produced a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractionRule {
    /// `<a href="...">`
    Anchor,
    /// A redirect assigned in an inline `on*` handler
    ScriptRedirect,
    /// A `data-*` navigation attribute on a non-anchor element
    DataAttribute,
}

/// A candidate link exactly as found in the markup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLink {
    pub href: String,
    /// Visible text, whitespace-collapsed; may be empty
    pub text: String,
    pub rule: ExtractionRule,
}

/// Result of running every rule over one document
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub links: Vec<RawLink>,

    /// References dropped because they can never be fetched
    pub discarded: usize,

    /// Value of `<base href>`, if the document declares one
    pub base_href: Option<String>,
}

/// A link resolved against its page and classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    pub url: Url,
    /// Link text, or a placeholder derived from the URL path
    pub label: String,
    pub kind: ResourceKind,
    pub rule: ExtractionRule,
}

/// Links discovered on one page
#[derive(Debug, Clone, Default)]
pub struct PageLinks {
    pub links: Vec<ResolvedLink>,
    pub discarded: usize,
}

impl PageLinks {
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }
}

/// What to do with a raw href before resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HrefDisposition {
    Keep,
    /// Never fetchable; counted
    Discard,
    /// Refers to the current page; dropped silently
    Ignore,
}

const DISCARDED_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:"];

const DATA_ATTRIBUTES: &[&str] = &["data-href", "data-url", "data-link", "data-download"];

fn disposition(href: &str) -> HrefDisposition {
    let href = href.trim();
    if href.is_empty() {
        return HrefDisposition::Discard;
    }
    if href.starts_with('#') {
        return HrefDisposition::Ignore;
    }
    let lower = href.to_ascii_lowercase();
    if DISCARDED_SCHEMES
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return HrefDisposition::Discard;
    }
    HrefDisposition::Keep
}

fn redirect_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r#"(?:(?:window|document|self|top)\.)?location(?:\.href)?\s*=\s*['"]([^'"]+)['"]"#,
            r#"|window\.open\s*\(\s*['"]([^'"]+)['"]"#,
            r#"|location\.(?:assign|replace)\s*\(\s*['"]([^'"]+)['"]"#,
        ))
        .expect("redirect pattern is valid")
    })
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn element_text(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// Runs every extraction rule over the markup
///
/// Results are unioned in rule order: anchors, then script redirects, then
/// data attributes. Within a rule, document order is kept.
///
/// # Arguments
///
/// * `html` - The page markup
///
/// # Returns
///
/// The raw candidates, the discarded count and the declared base href
///
/// # Example
///
/// ```
/// use sumi_gather::crawler::{extract_links, ExtractionRule};
///
/// let html = r#"<a href="/a">A</a><button onclick="location.href='/b'">B</button>"#;
/// let extraction = extract_links(html);
/// assert_eq!(extraction.links.len(), 2);
/// assert_eq!(extraction.links[1].rule, ExtractionRule::ScriptRedirect);
/// ```
pub fn extract_links(html: &str) -> Extraction {
    let document = Html::parse_document(html);
    let mut extraction = Extraction {
        base_href: extract_base_href(&document),
        ..Default::default()
    };

    let push = |extraction: &mut Extraction, href: &str, text: String, rule| {
        match disposition(href) {
            HrefDisposition::Keep => extraction.links.push(RawLink {
                href: href.trim().to_string(),
                text,
                rule,
            }),
            HrefDisposition::Discard => extraction.discarded += 1,
            HrefDisposition::Ignore => {}
        }
    };

    if let Some(anchors) = selector("a[href]") {
        for element in document.select(&anchors) {
            if let Some(href) = element.value().attr("href") {
                push(&mut extraction, href, element_text(&element), ExtractionRule::Anchor);
            }
        }
    }

    if let Some(all) = selector("*") {
        for element in document.select(&all) {
            let handlers = element
                .value()
                .attrs()
                .filter(|(name, _)| name.starts_with("on"))
                .map(|(_, value)| value);

            for handler in handlers {
                for caps in redirect_pattern().captures_iter(handler) {
                    let target = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3));
                    if let Some(target) = target {
                        push(
                            &mut extraction,
                            target.as_str(),
                            element_text(&element),
                            ExtractionRule::ScriptRedirect,
                        );
                    }
                }
            }
        }
    }

    let data_css = DATA_ATTRIBUTES
        .iter()
        .map(|attr| format!("[{}]", attr))
        .collect::<Vec<_>>()
        .join(", ");
    if let Some(markers) = selector(&data_css) {
        for element in document.select(&markers) {
            if element.value().name() == "a" && element.value().attr("href").is_some() {
                continue;
            }
            for attr in DATA_ATTRIBUTES {
                let Some(value) = element.value().attr(attr) else {
                    continue;
                };
                // `data-download="true"` style flags carry no target
                if is_flag_value(value) {
                    continue;
                }
                push(
                    &mut extraction,
                    value,
                    element_text(&element),
                    ExtractionRule::DataAttribute,
                );
                break;
            }
        }
    }

    extraction
}

fn is_flag_value(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "false" | "1" | "0" | "yes" | "no"
    )
}

fn extract_base_href(document: &Html) -> Option<String> {
    let base = selector("base[href]")?;
    document
        .select(&base)
        .next()
        .and_then(|element| element.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
}

/// Resolves raw candidates into absolute, deduplicated, classified links
///
/// The base URL is the document's `<base href>` (itself resolved against the
/// page URL) or the page URL. Candidates that do not resolve to an
/// `http`/`https` URL add to the discarded count. When two candidates
/// share a [`link_key`] the first one's URL and text win. Empty text is replaced
/// by a placeholder derived from the URL path.
pub fn resolve_links(extraction: Extraction, page_url: &Url, rules: &ArtifactRules) -> PageLinks {
    let base = extraction
        .base_href
        .as_deref()
        .and_then(|href| page_url.join(href).ok())
        .unwrap_or_else(|| page_url.clone());

    let mut seen: HashSet<Url> = HashSet::new();
    let mut page_links = PageLinks {
        links: Vec::with_capacity(extraction.links.len()),
        discarded: extraction.discarded,
    };

    for raw in extraction.links {
        let url = match normalize_url(&raw.href, &base) {
            Ok(url) => url,
            Err(e) => {
                tracing::trace!("Discarding reference {}: {}", raw.href, e);
                page_links.discarded += 1;
                continue;
            }
        };

        if !seen.insert(link_key(&url)) {
            continue;
        }

        let label = if raw.text.is_empty() {
            placeholder_label(&url)
        } else {
            raw.text
        };

        page_links.links.push(ResolvedLink {
            kind: classify(&url, rules),
            url,
            label,
            rule: raw.rule,
        });
    }

    page_links
}

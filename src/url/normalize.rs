use crate::UrlError;
use url::Url;

/// Resolves a raw reference against a base URL and normalizes the result
///
/// # Normalization Steps
///
/// 1. Resolve `href` relative to `base`; reject if malformed
/// 2. Require an `http` or `https` scheme
/// 3. Require a host (lowercased by the parser)
/// 4. Dot segments are removed by the parser
/// 5. Keep the query string and fragment as-is
///
/// Two references whose [`link_key`] is equal are the same link.
///
/// # Arguments
///
/// * `href` - The raw reference as found in the markup
/// * `base` - The page's base URL
///
/// # Returns
///
/// * `Ok(Url)` - Absolute, normalized URL
/// * `Err(UrlError)` - The reference cannot become a fetchable URL
///
/// # Examples
///
/// ```
/// use sumi_gather::url::normalize_url;
/// use url::Url;
///
/// let base = Url::parse("https://EXAMPLE.com/notice/index.html").unwrap();
/// let url = normalize_url("../files/a.pdf?v=2#page=3", &base).unwrap();
/// assert_eq!(url.as_str(), "https://example.com/files/a.pdf?v=2#page=3");
/// ```
pub fn normalize_url(href: &str, base: &Url) -> Result<Url, UrlError> {
    let mut url = base
        .join(href.trim())
        .map_err(|e| UrlError::Parse(format!("{}: {}", href, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost);
    }

    Ok(url)
}

/// Identity of a URL for deduplication and requests: the URL without its
/// fragment
///
/// # Examples
///
/// ```
/// use sumi_gather::url::link_key;
/// use url::Url;
///
/// let url = Url::parse("https://example.com/files/a.pdf?v=2#page=3").unwrap();
/// assert_eq!(link_key(&url).as_str(), "https://example.com/files/a.pdf?v=2");
/// ```
pub fn link_key(url: &Url) -> Url {
    let mut key = url.clone();
    key.set_fragment(None);
    key
}

/// Parses and normalizes an absolute URL such as the seed
pub fn normalize_absolute(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_url(url.as_str(), &url)
}

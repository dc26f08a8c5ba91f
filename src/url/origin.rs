use url::Url;

/// Returns the key used to pace requests per origin
///
/// The key is `scheme://host[:port]` with the host lowercased, so the same
/// server reached on different ports is paced independently.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_gather::url::origin_key;
///
/// let url = Url::parse("https://EXAMPLE.com/path").unwrap();
/// assert_eq!(origin_key(&url), "https://example.com");
///
/// let url = Url::parse("http://127.0.0.1:8080/a.pdf").unwrap();
/// assert_eq!(origin_key(&url), "http://127.0.0.1:8080");
/// ```
pub fn origin_key(url: &Url) -> String {
    url.origin().ascii_serialization()
}

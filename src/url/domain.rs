use url::Url;

/// Extracts the politeness key (lowercase host) from a URL
///
/// Ports are not part of the key: two services on the same host share one
/// request budget.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use catalog_harvest::url::extract_host;
///
/// let url = Url::parse("https://Shop.Example.com:8443/list?page=2").unwrap();
/// assert_eq!(extract_host(&url), Some("shop.example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.to_lowercase())
}

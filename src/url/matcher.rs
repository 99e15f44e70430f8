/// Checks whether a host matches a politeness-override pattern
///
/// Two pattern shapes are accepted:
/// 1. Exact host: `"shop.example.com"` matches only that host
/// 2. Wildcard: `"*.example.com"` matches `example.com` and every subdomain
///    below it (`www.example.com`, `cdn.eu.example.com`)
///
/// Both sides are expected to be lowercase already; hosts coming out of
/// [`NormalizedUrl`](crate::url::NormalizedUrl) always are.
///
/// # Examples
///
/// ```
/// use catalog_harvest::url::host_matches;
///
/// assert!(host_matches("shop.example.com", "shop.example.com"));
/// assert!(host_matches("*.example.com", "example.com"));
/// assert!(host_matches("*.example.com", "cdn.eu.example.com"));
/// assert!(!host_matches("*.example.com", "myexample.com"));
/// ```
pub fn host_matches(pattern: &str, host: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => {
            host == base
                || host
                    .strip_suffix(base)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        }
        None => host == pattern,
    }
}

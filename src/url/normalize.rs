use crate::url::{extract_host, NormalizedUrl};
use crate::UrlError;
use url::Url;

/// Normalizes a URL into its canonical crawl-target form
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Accept only `http` and `https` (scheme is lowercased by the parser)
/// 3. Lowercase the host
/// 4. Strip the port when it is the scheme default
/// 5. Discard the fragment
/// 6. Default an empty path to `/`
/// 7. Drop an empty trailing `?`
///
/// The query string is otherwise kept verbatim: listing pages paginate through
/// it and parameter order can be significant to the destination.
///
/// Normalization is pure and idempotent:
/// `normalize_url(normalize_url(u)?.as_str())? == normalize_url(u)?`.
///
/// # Examples
///
/// ```
/// use catalog_harvest::url::normalize_url;
///
/// let url = normalize_url("HTTP://Shop.Example.COM:80/list?page=2#top").unwrap();
/// assert_eq!(url.as_str(), "http://shop.example.com/list?page=2");
/// ```
pub fn normalize_url(url_str: &str) -> Result<NormalizedUrl, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_parsed(url)
}

/// Normalizes an already-parsed URL
pub fn normalize_parsed(mut url: Url) -> Result<NormalizedUrl, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = extract_host(&url).ok_or(UrlError::MissingHost)?;
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    if url.port().is_some() && url.port() == default_port(url.scheme()) {
        url.set_port(None)
            .map_err(|_| UrlError::Malformed("Failed to strip default port".to_string()))?;
    }

    url.set_fragment(None);

    if url.path().is_empty() {
        url.set_path("/");
    }

    if url.query() == Some("") {
        url.set_query(None);
    }

    Ok(NormalizedUrl::from_normalized(url))
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

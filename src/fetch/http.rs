//! Lightweight HTTP fetch path
//!
//! A plain GET through reqwest, tried before (or instead of) a browser
//! render. Response statuses are mapped onto [`FetchErrorKind`] so the
//! politeness gate can decide what to retry.

use crate::cache::Validators;
use crate::url::NormalizedUrl;
use crate::{FetchError, FetchErrorKind, FetchResult};
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Default user agent when none is configured
pub const DEFAULT_USER_AGENT: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// A response worth handing to the challenge detector
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub final_url: String,
    pub body: String,
    pub validators: Validators,
    /// The server answered 304 to a conditional request
    pub not_modified: bool,
}

/// Builds an HTTP client for the lightweight path
///
/// # Arguments
///
/// * `user_agent` - Value for the User-Agent header
/// * `timeout` - Whole-request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// GET-only fetcher with status classification
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self::from_client(build_http_client(user_agent, timeout)?))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Fetches `url`, sending conditional headers when `validators` are given
    ///
    /// | Response | Outcome |
    /// |----------|---------|
    /// | 2xx | `Ok`, body returned |
    /// | 304 | `Ok` with `not_modified` and an empty body |
    /// | 401, 403 | `Ok`; the challenge detector judges the body |
    /// | 429 | `RateLimited` |
    /// | 500, 502, 503, 504 | `ServiceUnavailable` |
    /// | other | `HttpStatus` |
    /// | timeout | `Timeout` |
    /// | connect failure | `ConnectionRefused` |
    pub async fn fetch(
        &self,
        url: &NormalizedUrl,
        validators: Option<&Validators>,
    ) -> FetchResult<HttpResponse> {
        let mut request = self.client.get(url.as_str());
        if let Some(validators) = validators {
            if let Some(etag) = &validators.etag {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = &validators.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify_transport_error(url, &e))?;

        let status = response.status();
        let final_url = response.url().to_string();
        tracing::debug!(url = %url, status = status.as_u16(), "lightweight fetch");

        if status == StatusCode::NOT_MODIFIED {
            return Ok(HttpResponse {
                status: status.as_u16(),
                final_url,
                body: String::new(),
                validators: validators.cloned().unwrap_or_default(),
                not_modified: true,
            });
        }

        if let Some(error) = classify_status(url, status) {
            return Err(error);
        }

        let validators = Validators {
            etag: header_string(&response, ETAG),
            last_modified: header_string(&response, LAST_MODIFIED),
        };

        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(url, &e))?;

        Ok(HttpResponse {
            status: status.as_u16(),
            final_url,
            body,
            validators,
            not_modified: false,
        })
    }
}

fn header_string(
    response: &reqwest::Response,
    name: reqwest::header::HeaderName,
) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Maps a status to a failure, or None when the body should be used
fn classify_status(url: &NormalizedUrl, status: StatusCode) -> Option<FetchError> {
    if status.is_success() {
        return None;
    }

    let kind = match status {
        // blocking pages carry a body the detector knows how to read
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return None,
        StatusCode::TOO_MANY_REQUESTS => FetchErrorKind::RateLimited,
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => FetchErrorKind::ServiceUnavailable,
        _ => FetchErrorKind::HttpStatus,
    };

    Some(
        FetchError::new(url.as_str(), kind, format!("HTTP {}", status.as_u16()))
            .with_status(status.as_u16()),
    )
}

fn classify_transport_error(url: &NormalizedUrl, error: &reqwest::Error) -> FetchError {
    let kind = if error.is_timeout() {
        FetchErrorKind::Timeout
    } else if error.is_connect() {
        FetchErrorKind::ConnectionRefused
    } else {
        FetchErrorKind::Other
    };
    FetchError::new(url.as_str(), kind, error.to_string())
}

//! Catalog-Harvest: a polite, cached, resumable crawl engine
//!
//! This crate turns a handful of seed listing URLs into a stream of rendered
//! product-detail documents. Every network request passes through a politeness
//! gate, every usable response lands in a persistent TTL-aware cache, and
//! anti-bot challenge pages are detected before they can overwrite good data.

pub mod browser;
pub mod cache;
pub mod challenge;
pub mod config;
pub mod crawler;
pub mod fetch;
pub mod gate;
pub mod output;
pub mod session;
pub mod url;

use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Main error type for Catalog-Harvest operations
///
/// Only configuration-class failures escape a crawl run; everything that goes
/// wrong for a single candidate is reported as a [`FetchError`] and contained.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Cache error: {0}")]
    Cache(#[from] cache::CacheError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("No seed URLs supplied for crawl run")]
    NoSeeds,

    #[error("No reachable browser backend: {0}")]
    BrowserUnavailable(String),

    #[error("Crawl driver task failed: {0}")]
    Driver(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid host pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid CSS selector: {0}")]
    InvalidSelector(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Structured classification of a failed fetch attempt
///
/// The politeness gate decides whether to retry by looking at the kind, never
/// at the message text. Which kinds are retryable is policy (see
/// [`gate::PolitenessPolicy::retry_on`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchErrorKind {
    /// Destination answered HTTP 429
    RateLimited,
    /// Destination answered 502/503/504
    ServiceUnavailable,
    /// Connect or read timed out
    Timeout,
    /// TCP connection refused or reset
    ConnectionRefused,
    /// Response was classified as an anti-bot challenge page
    Challenged,
    /// Browser session crashed or wedged twice in a row
    RenderFault,
    /// No browser session could be created
    SessionUnavailable,
    /// Any other non-success HTTP status
    HttpStatus,
    /// Cache-only fetch found nothing cached
    CacheMiss,
    /// The run was cancelled while this fetch was pending
    Cancelled,
    /// Anything else
    Other,
}

impl FetchErrorKind {
    /// Returns the kebab-case name used in config files and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate-limited",
            Self::ServiceUnavailable => "service-unavailable",
            Self::Timeout => "timeout",
            Self::ConnectionRefused => "connection-refused",
            Self::Challenged => "challenged",
            Self::RenderFault => "render-fault",
            Self::SessionUnavailable => "session-unavailable",
            Self::HttpStatus => "http-status",
            Self::CacheMiss => "cache-miss",
            Self::Cancelled => "cancelled",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed fetch for one URL
#[derive(Debug, Clone, Error)]
#[error("{kind} fetching {url}: {message}")]
pub struct FetchError {
    pub url: String,
    pub kind: FetchErrorKind,
    pub message: String,
    /// HTTP status, when the failure came from a response
    pub status: Option<u16>,
}

impl FetchError {
    pub fn new(url: impl Into<String>, kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::new(url, FetchErrorKind::Cancelled, "run cancelled")
    }
}

/// Result type alias for Catalog-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

/// Result type alias for a single fetch
pub type FetchResult<T> = std::result::Result<T, FetchError>;

// Re-export commonly used types
pub use cache::{CacheEntry, CacheKey, FsCache};
pub use challenge::{ChallengeDetector, Verdict};
pub use config::Config;
pub use crawler::{CrawlCandidate, CrawlReport, CrawlRun, Crawler, FetchedDocument, LinkStrategy};
pub use fetch::{FetchOptions, PageKind, PostLoadHook};
pub use gate::{PolitenessGate, PolitenessPolicy};
pub use url::{normalize_url, NormalizedUrl};

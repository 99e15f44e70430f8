//! URL handling module for Catalog-Harvest
//!
//! This module provides URL normalization, host extraction, and host pattern
//! matching for per-destination politeness overrides.

mod domain;
mod matcher;
mod normalize;

use std::fmt;
use url::Url;

// Re-export main functions
pub use domain::extract_host;
pub use matcher::host_matches;
pub use normalize::{normalize_parsed, normalize_url};

/// A URL in canonical crawl-target form
///
/// Can only be built through [`normalize_url`] / [`normalize_parsed`], so two
/// values compare equal exactly when they denote the same crawl target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedUrl(Url);

impl NormalizedUrl {
    pub(crate) fn from_normalized(url: Url) -> Self {
        Self(url)
    }

    /// Parses and normalizes a URL string
    pub fn parse(url_str: &str) -> crate::UrlResult<Self> {
        normalize_url(url_str)
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Lowercase host, used as the politeness and session key
    pub fn host(&self) -> &str {
        // normalize_parsed rejects URLs without a host
        self.0.host_str().unwrap_or_default()
    }

    pub fn into_url(self) -> Url {
        self.0
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl AsRef<str> for NormalizedUrl {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

//! Fetching module
//!
//! This module turns a normalized URL into a usable document:
//! - Per-call [`FetchOptions`] and post-load readiness hooks
//! - The lightweight HTTP path
//! - The cache-first [`Fetcher`] pipeline tying cache, gate, browser, and
//!   challenge detector together

mod http;
mod options;
mod pipeline;

pub use http::{build_http_client, HttpFetcher, HttpResponse, DEFAULT_USER_AGENT};
pub use options::{
    DefaultFetchOptions, FetchOptions, FetchOptionsFactory, PostLoadHook, DETAIL_TTL, LISTING_TTL,
};
pub use pipeline::Fetcher;

use crate::cache::{CacheEntry, Validators};
use crate::url::NormalizedUrl;

/// Which side of the catalog a page belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Listing or pagination page
    Listing,
    /// Single product page
    Detail,
}

/// Where a document came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentOrigin {
    Cache,
    Lightweight,
    Browser,
}

impl DocumentOrigin {
    pub fn is_network(&self) -> bool {
        !matches!(self, Self::Cache)
    }
}

/// A fetched page, ready for classification or link extraction
#[derive(Debug, Clone)]
pub struct Document {
    pub url: NormalizedUrl,
    pub html: String,
    pub status: u16,
    pub validators: Validators,
    pub origin: DocumentOrigin,
}

impl Document {
    pub fn new(url: NormalizedUrl, html: impl Into<String>, status: u16, origin: DocumentOrigin) -> Self {
        Self {
            url,
            html: html.into(),
            status,
            validators: Validators::default(),
            origin,
        }
    }

    pub(crate) fn from_entry(url: NormalizedUrl, entry: &CacheEntry, origin: DocumentOrigin) -> Self {
        Self {
            url,
            html: entry.raw_document.clone(),
            status: entry.http_status,
            validators: entry.validators.clone(),
            origin,
        }
    }
}

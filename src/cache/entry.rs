use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP cache validators captured from the response that produced an entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validators {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl Validators {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// A previously fetched document as persisted on disk
///
/// One JSON file per [`CacheKey`](crate::cache::CacheKey). Only the
/// [`FsCache`](crate::cache::FsCache) creates or deletes these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Hex cache key (redundant with the file name, kept for inspection)
    pub key: String,

    /// Normalized URL the document was fetched from
    pub source_url: String,

    /// Raw or rendered HTML
    pub raw_document: String,

    pub http_status: u16,

    #[serde(default)]
    pub validators: Validators,

    pub saved_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Returns true while `saved_at + ttl` is still in the future
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.is_fresh_at(ttl, Utc::now())
    }

    /// Freshness judged against an explicit clock reading
    ///
    /// A TTL too large to represent never expires.
    pub fn is_fresh_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => match self.saved_at.checked_add_signed(ttl) {
                Some(expires_at) => expires_at > now,
                None => true,
            },
            Err(_) => true,
        }
    }

    /// Age of the entry at the current time
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.saved_at
    }
}

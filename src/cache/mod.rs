//! Fetch cache module
//!
//! This module maps normalized URLs to previously fetched documents:
//! - Stable SHA-256 cache keys
//! - JSON entries with status, validators, and save time
//! - Atomic write-temp-then-rename persistence with a staged/commit split
//! - Freshness judgment against a caller-supplied TTL

mod entry;
mod key;
mod store;

pub use entry::{CacheEntry, Validators};
pub use key::CacheKey;
pub use store::{CacheInventory, FsCache, StagedEntry};

use thiserror::Error;

/// Errors raised by cache storage internals
///
/// These never abort a crawl; callers log them and carry on as if the
/// cache had missed.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

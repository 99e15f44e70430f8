use crate::url::NormalizedUrl;
use sha2::{Digest, Sha256};
use std::fmt;

/// Storage identifier for a cached document
///
/// SHA-256 hex digest of the normalized URL. The derivation must stay stable
/// across releases so a restarted process finds the work of the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_url(url: &NormalizedUrl) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(url.as_str().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-character fan-out directory so no single directory grows huge
    pub(crate) fn shard(&self) -> &str {
        &self.0[..2]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_sha256_hex() {
        let url = NormalizedUrl::parse("http://shop.test/item/42").unwrap();
        let key = CacheKey::for_url(&url);
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_equivalent_urls_share_key() {
        let a = NormalizedUrl::parse("http://SHOP.test:80/item/42#gallery").unwrap();
        let b = NormalizedUrl::parse("http://shop.test/item/42").unwrap();
        assert_eq!(CacheKey::for_url(&a), CacheKey::for_url(&b));
    }

    #[test]
    fn test_known_digest_is_stable() {
        // sha256("http://shop.test/")
        let url = NormalizedUrl::parse("http://shop.test").unwrap();
        let key = CacheKey::for_url(&url);
        let mut hasher = Sha256::new();
        hasher.update(b"http://shop.test/");
        assert_eq!(key.as_str(), hex::encode(hasher.finalize()));
    }
}

//! Filesystem-backed fetch cache
//!
//! Layout: `<root>/<first two hex chars of key>/<key>.json`. Entries are
//! written to a dot-prefixed temp file in the same directory and renamed into
//! place, so a reader sees either the old entry or the new one, never a torn
//! write.

use crate::cache::entry::{CacheEntry, Validators};
use crate::cache::key::CacheKey;
use crate::cache::{CacheError, CacheResult};
use crate::url::NormalizedUrl;
use chrono::Utc;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Persistent, TTL-aware document cache
///
/// Storage faults never escape the read path: a missing, unreadable, or
/// corrupt entry is logged and reported as a miss.
#[derive(Debug)]
pub struct FsCache {
    root: PathBuf,
}

/// Summary of what is currently cached
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheInventory {
    pub entries: u64,
    pub total_bytes: u64,
    pub fresh: u64,
    pub stale: u64,
    pub unreadable: u64,
}

impl FsCache {
    /// Opens (creating if needed) a cache rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> CacheResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(key.shard())
            .join(format!("{}.json", key.as_str()))
    }

    /// Looks up the entry for `url` without judging freshness
    pub fn read(&self, url: &NormalizedUrl) -> Option<CacheEntry> {
        let key = CacheKey::for_url(url);
        let path = self.entry_path(&key);

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "corrupt cache entry, treating as miss");
                None
            }
        }
    }

    /// Writes (overwrites) the entry for `url` atomically
    pub fn write(
        &self,
        url: &NormalizedUrl,
        raw_document: &str,
        http_status: u16,
        validators: &Validators,
    ) -> CacheResult<()> {
        self.stage(url, raw_document, http_status, validators)?
            .commit()
    }

    /// Writes a new entry to a temp file without publishing it
    ///
    /// The returned [`StagedEntry`] must be committed to replace the current
    /// entry; discarding (or dropping) it leaves the current entry untouched.
    pub fn stage(
        &self,
        url: &NormalizedUrl,
        raw_document: &str,
        http_status: u16,
        validators: &Validators,
    ) -> CacheResult<StagedEntry> {
        let key = CacheKey::for_url(url);
        let final_path = self.entry_path(&key);
        let dir = final_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&dir)?;

        let entry = CacheEntry {
            key: key.to_string(),
            source_url: url.to_string(),
            raw_document: raw_document.to_string(),
            http_status,
            validators: validators.clone(),
            saved_at: Utc::now(),
        };
        let body = serde_json::to_vec(&entry)?;

        let temp_path = dir.join(format!(
            ".{}.{}-{}.tmp",
            key.as_str(),
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        // dropped on any error below, which removes the temp file
        let staged = StagedEntry {
            key,
            temp_path: Some(temp_path.clone()),
            final_path,
        };

        let mut file = fs::File::create(&temp_path)?;
        file.write_all(&body)?;
        file.sync_all()?;
        drop(file);

        tracing::trace!(key = %staged.key, "staged cache entry");
        Ok(staged)
    }

    /// Deletes the entry for `url`; missing entries are fine
    pub fn invalidate(&self, url: &NormalizedUrl) {
        let key = CacheKey::for_url(url);
        match fs::remove_file(self.entry_path(&key)) {
            Ok(()) => tracing::debug!(url = %url, "invalidated cache entry"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(url = %url, error = %e, "cache invalidate failed"),
        }
    }

    /// `entry.saved_at + ttl > now`
    pub fn is_fresh(entry: &CacheEntry, ttl: Duration) -> bool {
        entry.is_fresh(ttl)
    }

    /// Walks the cache root and classifies every entry against `ttl`
    pub fn inventory(&self, ttl: Duration) -> CacheResult<CacheInventory> {
        let mut inventory = CacheInventory::default();
        for path in self.entry_files()? {
            inventory.entries += 1;
            inventory.total_bytes += fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            match read_entry(&path) {
                Some(entry) if entry.is_fresh(ttl) => inventory.fresh += 1,
                Some(_) => inventory.stale += 1,
                None => inventory.unreadable += 1,
            }
        }
        Ok(inventory)
    }

    /// Removes entries older than `ttl` plus unreadable ones
    ///
    /// Returns how many files were deleted.
    pub fn purge_stale(&self, ttl: Duration) -> CacheResult<usize> {
        let mut removed = 0;
        for path in self.entry_files()? {
            let keep = read_entry(&path).is_some_and(|entry| entry.is_fresh(ttl));
            if !keep {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(CacheError::Io(e)),
                }
            }
        }
        tracing::info!(removed, root = %self.root.display(), "purged stale cache entries");
        Ok(removed)
    }

    fn entry_files(&self) -> CacheResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for shard in fs::read_dir(&self.root)? {
            let shard = shard?.path();
            if !shard.is_dir() {
                continue;
            }
            for file in fs::read_dir(&shard)? {
                let path = file?.path();
                let is_entry = path.extension().is_some_and(|ext| ext == "json")
                    && !path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with('.'));
                if is_entry {
                    files.push(path);
                }
            }
        }
        Ok(files)
    }
}

fn read_entry(path: &Path) -> Option<CacheEntry> {
    fs::read(path)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
}

/// A cache write that has been persisted but not yet published
pub struct StagedEntry {
    key: CacheKey,
    temp_path: Option<PathBuf>,
    final_path: PathBuf,
}

impl StagedEntry {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Atomically replaces the current entry with the staged one
    pub fn commit(mut self) -> CacheResult<()> {
        if let Some(temp_path) = self.temp_path.take() {
            if let Err(e) = fs::rename(&temp_path, &self.final_path) {
                let _ = fs::remove_file(&temp_path);
                return Err(CacheError::Io(e));
            }
            tracing::trace!(key = %self.key, "committed cache entry");
        }
        Ok(())
    }

    /// Throws the staged write away; the current entry is left as it was
    pub fn discard(mut self) {
        self.remove_temp();
        tracing::debug!(key = %self.key, "discarded staged cache entry");
    }

    fn remove_temp(&mut self) {
        if let Some(temp_path) = self.temp_path.take() {
            if let Err(e) = fs::remove_file(&temp_path) {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!(path = %temp_path.display(), error = %e, "failed to remove staged cache file");
                }
            }
        }
    }
}

impl Drop for StagedEntry {
    fn drop(&mut self) {
        self.remove_temp();
    }
}

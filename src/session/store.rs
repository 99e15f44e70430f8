use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A browser cookie in a backend-neutral form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,

    #[serde(default = "default_path")]
    pub path: String,

    /// Expiry as seconds since the Unix epoch; `None` for session cookies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,

    #[serde(default)]
    pub secure: bool,

    #[serde(default)]
    pub http_only: bool,
}

fn default_path() -> String {
    "/".to_string()
}

impl StoredCookie {
    /// Returns true if the cookie has an expiry that lies in the past
    pub fn is_expired(&self) -> bool {
        match self.expires {
            Some(expires) => (expires as i64) < chrono::Utc::now().timestamp(),
            None => false,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    host: String,
    cookies: Vec<StoredCookie>,
}

/// Cookie jar persisted as one JSON file per host
///
/// Writers for the same host are serialized; different hosts never contend.
/// Every failure degrades to "no cookies" and is logged, so a broken session
/// directory slows a crawl down but never stops it.
#[derive(Debug)]
pub struct SessionStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn host_lock(&self, host: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn host_path(&self, host: &str) -> PathBuf {
        self.root.join(format!("{}.json", sanitize_host(host)))
    }

    /// Loads the unexpired cookies stored for `host`
    pub async fn load(&self, host: &str) -> Vec<StoredCookie> {
        let lock = self.host_lock(host);
        let _guard = lock.lock().await;

        let bytes = match tokio::fs::read(self.host_path(host)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!(host, error = %e, "failed to read session file");
                return Vec::new();
            }
        };

        match serde_json::from_slice::<SessionFile>(&bytes) {
            Ok(file) => file
                .cookies
                .into_iter()
                .filter(|cookie| !cookie.is_expired())
                .collect(),
            Err(e) => {
                tracing::warn!(host, error = %e, "corrupt session file, ignoring");
                Vec::new()
            }
        }
    }

    /// Replaces the stored cookies for `host`
    pub async fn save(&self, host: &str, cookies: &[StoredCookie]) {
        let lock = self.host_lock(host);
        let _guard = lock.lock().await;

        if let Err(e) = self.write_file(host, cookies).await {
            tracing::warn!(host, error = %e, "failed to persist session cookies");
        } else {
            tracing::debug!(host, count = cookies.len(), "saved session cookies");
        }
    }

    async fn write_file(&self, host: &str, cookies: &[StoredCookie]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;

        let file = SessionFile {
            host: host.to_string(),
            cookies: cookies.to_vec(),
        };
        let body = serde_json::to_vec_pretty(&file)?;

        let final_path = self.host_path(host);
        let temp_path = self.root.join(format!(
            ".{}.{}-{}.tmp",
            sanitize_host(host),
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        tokio::fs::write(&temp_path, &body).await?;
        if let Err(e) = tokio::fs::rename(&temp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }
        Ok(())
    }

    /// Forgets everything stored for `host`
    pub async fn clear(&self, host: &str) {
        let lock = self.host_lock(host);
        let _guard = lock.lock().await;

        match tokio::fs::remove_file(self.host_path(host)).await {
            Ok(()) => tracing::debug!(host, "cleared session cookies"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(host, error = %e, "failed to clear session file"),
        }
    }
}

/// Maps a host to a safe file stem
fn sanitize_host(host: &str) -> String {
    host.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect()
}

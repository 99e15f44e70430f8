//! Browser session pool
//!
//! Long-lived scriptable browser sessions that navigate to a URL, let
//! client-side rendering settle, and hand back the rendered HTML. The pool
//! owns the sessions; a [`SessionFactory`] creates them, so the crawl engine
//! never knows whether it is talking to Chromium or to a test double.

mod chrome;
mod pool;

pub use chrome::{ChromeOptions, ChromeSessionFactory};
pub use pool::BrowserSessionPool;

#[cfg(test)]
pub(crate) use pool::testing;

use crate::fetch::PostLoadHook;
use crate::session::StoredCookie;
use crate::url::NormalizedUrl;
use crate::FetchResult;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Everything a session needs to render one page
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub url: &'a NormalizedUrl,
    /// Cookies to install before navigating
    pub cookies: &'a [StoredCookie],
    pub hook: Option<&'a PostLoadHook>,
    /// Bound on the navigation itself
    pub timeout: Duration,
}

/// Result of a successful render
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub html: String,
    /// Where the browser ended up after redirects
    pub final_url: String,
    /// Cookies the destination holds after the visit
    pub cookies: Vec<StoredCookie>,
}

/// One scriptable browser session
///
/// A session handles a single navigation at a time; the pool guarantees
/// exclusive access.
#[async_trait]
pub trait RenderSession: Send {
    async fn render(&mut self, request: RenderRequest<'_>) -> FetchResult<RenderedPage>;

    /// Releases the underlying browser; the session is not used afterwards
    async fn shutdown(&mut self);
}

/// Creates browser sessions for the pool
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self) -> FetchResult<Box<dyn RenderSession>>;

    /// Human-readable backend description for logs and startup errors
    fn describe(&self) -> String;
}

/// Polls `probe` every `interval` until it returns true or `timeout` passes
///
/// Returns whether the condition was met.
pub async fn wait_until<F, Fut>(timeout: Duration, interval: Duration, mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if probe().await {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_wait_until_met() {
        let polls = AtomicU32::new(0);
        let counter = &polls;
        let met = wait_until(Duration::from_secs(1), Duration::from_millis(5), move || async move {
            counter.fetch_add(1, Ordering::SeqCst) >= 2
        })
        .await;
        assert!(met);
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_until_times_out() {
        let started = Instant::now();
        let met = wait_until(Duration::from_millis(30), Duration::from_millis(5), || async {
            false
        })
        .await;
        assert!(!met);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}

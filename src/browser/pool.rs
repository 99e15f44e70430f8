use crate::browser::{RenderRequest, RenderSession, RenderedPage, SessionFactory};
use crate::fetch::PostLoadHook;
use crate::session::SessionStore;
use crate::url::NormalizedUrl;
use crate::{FetchError, FetchErrorKind, FetchResult, HarvestError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;

const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

struct Slot {
    session: Option<Box<dyn RenderSession>>,
    /// Pool generation the session was created in
    generation: u64,
}

/// Exclusive use of one slot; dropping it checks the slot back in
struct Checkout<'a> {
    index: usize,
    slot: MutexGuard<'a, Slot>,
    _permit: SemaphorePermit<'a>,
}

/// Arena of browser sessions with exclusive checkout
///
/// Sessions are created lazily on first checkout. `restart()` invalidates
/// every session at once by bumping the pool generation; each slot notices
/// on its next checkout and recreates its session.
pub struct BrowserSessionPool {
    factory: Arc<dyn SessionFactory>,
    sessions: Option<Arc<SessionStore>>,
    slots: Vec<Mutex<Slot>>,
    stale: Vec<AtomicBool>,
    available: Semaphore,
    generation: AtomicU64,
    navigation_timeout: Duration,
    created: AtomicU64,
    restarts: AtomicU64,
}

impl BrowserSessionPool {
    /// Creates a pool of `size` sessions (at least one)
    pub fn new(factory: Arc<dyn SessionFactory>, size: usize) -> Self {
        let size = size.max(1);
        Self {
            factory,
            sessions: None,
            slots: (0..size)
                .map(|_| {
                    Mutex::new(Slot {
                        session: None,
                        generation: 0,
                    })
                })
                .collect(),
            stale: (0..size).map(|_| AtomicBool::new(false)).collect(),
            available: Semaphore::new(size),
            generation: AtomicU64::new(0),
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            created: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
        }
    }

    /// Persists and replays cookies through `store`
    pub fn with_session_store(mut self, store: Arc<SessionStore>) -> Self {
        self.sessions = Some(store);
        self
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn describe(&self) -> String {
        self.factory.describe()
    }

    /// Sessions created over the pool's lifetime
    pub fn sessions_created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Whole-pool restarts requested so far
    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::Relaxed)
    }

    /// Creates one session up front so a missing backend fails at startup
    pub async fn warm_up(&self) -> crate::Result<()> {
        let never = CancellationToken::new();
        let label = "warm-up";

        let mut checkout = self.checkout(label, &never).await.map_err(|e| {
            HarvestError::BrowserUnavailable(format!("{}: {}", self.describe(), e.message))
        })?;
        self.ensure_session(&mut checkout, label).await.map_err(|e| {
            HarvestError::BrowserUnavailable(format!("{}: {}", self.describe(), e.message))
        })?;

        tracing::info!(backend = %self.describe(), pool_size = self.size(), "browser pool ready");
        Ok(())
    }

    /// Tears down every session; each is recreated on its next checkout
    pub fn restart(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.restarts.fetch_add(1, Ordering::Relaxed);
        tracing::info!(generation, "browser pool restart requested");
    }

    /// Marks a single wedged session for recreation
    pub fn restart_slot(&self, index: usize) {
        if let Some(flag) = self.stale.get(index) {
            flag.store(true, Ordering::SeqCst);
            tracing::debug!(slot = index, "browser slot restart requested");
        }
    }

    /// Renders `url` in a pooled session
    ///
    /// Stored cookies for the host are installed first and the session's
    /// cookies are persisted after a successful render. A navigation that
    /// times out or faults gets its slot restarted and is retried once.
    ///
    /// # Arguments
    ///
    /// * `url` - Page to render
    /// * `hook` - Optional readiness condition to wait for after load
    /// * `cancel` - Run-level cancellation token
    ///
    /// # Returns
    ///
    /// * `Ok(RenderedPage)` - Rendered HTML, final URL, and cookies
    /// * `Err(FetchError)` - `SessionUnavailable`, `RenderFault`, or `Cancelled`
    pub async fn navigate_and_render(
        &self,
        url: &NormalizedUrl,
        hook: Option<&PostLoadHook>,
        cancel: &CancellationToken,
    ) -> FetchResult<RenderedPage> {
        let cookies = match &self.sessions {
            Some(store) => store.load(url.host()).await,
            None => Vec::new(),
        };

        let mut checkout = self.checkout(url.as_str(), cancel).await?;
        let slot_index = checkout.index;
        let budget = self
            .navigation_timeout
            .saturating_add(hook.map(PostLoadHook::timeout).unwrap_or_default());
        let mut last_fault: Option<FetchError> = None;

        for attempt in 1..=2u32 {
            self.ensure_session(&mut checkout, url.as_str()).await?;
            let Some(session) = checkout.slot.session.as_mut() else {
                return Err(FetchError::new(
                    url.as_str(),
                    FetchErrorKind::SessionUnavailable,
                    "browser slot has no session",
                ));
            };

            let request = RenderRequest {
                url,
                cookies: &cookies,
                hook,
                timeout: self.navigation_timeout,
            };

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // a navigation abandoned midway leaves the session in an unknown state
                    self.restart_slot(slot_index);
                    return Err(FetchError::cancelled(url.as_str()));
                }
                result = tokio::time::timeout(budget, session.render(request)) => result,
            };

            let fault = match outcome {
                Ok(Ok(page)) => {
                    if let Some(store) = &self.sessions {
                        if !page.cookies.is_empty() {
                            store.save(url.host(), &page.cookies).await;
                        }
                    }
                    tracing::debug!(url = %url, slot = slot_index, bytes = page.html.len(), "rendered page");
                    return Ok(page);
                }
                Ok(Err(error)) if error.kind == FetchErrorKind::Cancelled => return Err(error),
                Ok(Err(error)) => error,
                Err(_) => FetchError::new(
                    url.as_str(),
                    FetchErrorKind::Timeout,
                    format!("navigation exceeded {}ms", budget.as_millis()),
                ),
            };

            tracing::warn!(
                url = %url,
                slot = slot_index,
                attempt,
                kind = %fault.kind,
                error = %fault.message,
                "browser session fault, restarting slot"
            );
            self.teardown(&mut checkout).await;
            last_fault = Some(fault);
        }

        let message = last_fault
            .map(|fault| fault.message)
            .unwrap_or_else(|| "render failed".to_string());
        Err(FetchError::new(
            url.as_str(),
            FetchErrorKind::RenderFault,
            format!("render failed after slot restart: {message}"),
        ))
    }

    /// Shuts down every live session, waiting for in-flight renders
    pub async fn shutdown(&self) {
        let total = self.slots.len() as u32;
        let Ok(_all) = self.available.acquire_many(total).await else {
            return;
        };
        for slot in &self.slots {
            let mut slot = slot.lock().await;
            if let Some(mut session) = slot.session.take() {
                session.shutdown().await;
            }
        }
        tracing::info!(backend = %self.describe(), "browser pool shut down");
    }

    async fn checkout(&self, url: &str, cancel: &CancellationToken) -> FetchResult<Checkout<'_>> {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::cancelled(url)),
            permit = self.available.acquire() => permit.map_err(|_| {
                FetchError::new(url, FetchErrorKind::SessionUnavailable, "browser pool closed")
            })?,
        };

        // holding a permit guarantees at least one unlocked slot
        for (index, slot) in self.slots.iter().enumerate() {
            if let Ok(guard) = slot.try_lock() {
                return Ok(Checkout {
                    index,
                    slot: guard,
                    _permit: permit,
                });
            }
        }

        Err(FetchError::new(
            url,
            FetchErrorKind::SessionUnavailable,
            "no free browser slot",
        ))
    }

    /// Makes sure the checked-out slot holds a current session
    async fn ensure_session(&self, checkout: &mut Checkout<'_>, url: &str) -> FetchResult<()> {
        let generation = self.generation.load(Ordering::SeqCst);
        let flagged = self.stale[checkout.index].swap(false, Ordering::SeqCst);
        if flagged || checkout.slot.generation != generation {
            self.teardown(checkout).await;
        }

        if checkout.slot.session.is_none() {
            let session = self.factory.create().await.map_err(|e| {
                tracing::error!(backend = %self.describe(), error = %e.message, "failed to create browser session");
                FetchError::new(url, FetchErrorKind::SessionUnavailable, e.message)
            })?;
            let total = self.created.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::debug!(slot = checkout.index, generation, total, "created browser session");
            checkout.slot.session = Some(session);
            checkout.slot.generation = generation;
        }
        Ok(())
    }

    async fn teardown(&self, checkout: &mut Checkout<'_>) {
        if let Some(mut session) = checkout.slot.session.take() {
            session.shutdown().await;
        }
    }
}

impl std::fmt::Debug for BrowserSessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserSessionPool")
            .field("backend", &self.describe())
            .field("size", &self.slots.len())
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{ScriptedFactory, Step};
    use super::*;
    use tempfile::TempDir;

    fn url(s: &str) -> NormalizedUrl {
        NormalizedUrl::parse(s).unwrap()
    }

    fn pool_with(steps: Vec<Step>) -> (Arc<ScriptedFactory>, BrowserSessionPool) {
        let factory = Arc::new(ScriptedFactory::with_steps(steps));
        let pool = BrowserSessionPool::new(factory.clone(), 1)
            .with_navigation_timeout(Duration::from_millis(100));
        (factory, pool)
    }

    #[tokio::test]
    async fn test_render_creates_session_lazily() {
        let (factory, pool) = pool_with(vec![Step::Html("<p>ok</p>".to_string())]);
        assert_eq!(factory.creates.load(Ordering::SeqCst), 0);

        let cancel = CancellationToken::new();
        let page = pool
            .navigate_and_render(&url("http://shop.test/item/1"), None, &cancel)
            .await
            .unwrap();
        assert_eq!(page.html, "<p>ok</p>");
        assert_eq!(pool.sessions_created(), 1);

        // session is reused
        pool.navigate_and_render(&url("http://shop.test/item/2"), None, &cancel)
            .await
            .unwrap();
        assert_eq!(pool.sessions_created(), 1);
    }

    #[tokio::test]
    async fn test_fault_restarts_slot_and_retries_once() {
        let (factory, pool) = pool_with(vec![Step::Fault, Step::Html("<p>second</p>".to_string())]);
        let cancel = CancellationToken::new();
        let page = pool
            .navigate_and_render(&url("http://shop.test/item/1"), None, &cancel)
            .await
            .unwrap();
        assert_eq!(page.html, "<p>second</p>");
        assert_eq!(factory.creates.load(Ordering::SeqCst), 2);
        assert_eq!(factory.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_fault_is_render_fault() {
        let (_factory, pool) = pool_with(vec![Step::Fault, Step::Hang]);
        let cancel = CancellationToken::new();
        let error = pool
            .navigate_and_render(&url("http://shop.test/item/1"), None, &cancel)
            .await
            .unwrap_err();
        assert_eq!(error.kind, FetchErrorKind::RenderFault);
    }

    #[tokio::test]
    async fn test_timeout_is_retried() {
        let (_factory, pool) = pool_with(vec![Step::Hang, Step::Html("<p>late</p>".to_string())]);
        let cancel = CancellationToken::new();
        let page = pool
            .navigate_and_render(&url("http://shop.test/item/1"), None, &cancel)
            .await
            .unwrap();
        assert_eq!(page.html, "<p>late</p>");
    }

    #[tokio::test]
    async fn test_restart_recreates_sessions_on_next_checkout() {
        let (factory, pool) = pool_with(vec![]);
        let cancel = CancellationToken::new();
        let target = url("http://shop.test/");

        pool.navigate_and_render(&target, None, &cancel).await.unwrap();
        pool.restart();
        pool.navigate_and_render(&target, None, &cancel).await.unwrap();

        assert_eq!(factory.creates.load(Ordering::SeqCst), 2);
        assert_eq!(factory.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(pool.restarts(), 1);
    }

    #[tokio::test]
    async fn test_restart_slot_recreates_one_session() {
        let (factory, pool) = pool_with(vec![]);
        let cancel = CancellationToken::new();
        let target = url("http://shop.test/");

        pool.navigate_and_render(&target, None, &cancel).await.unwrap();
        pool.restart_slot(0);
        pool.restart_slot(99);
        pool.navigate_and_render(&target, None, &cancel).await.unwrap();
        assert_eq!(factory.creates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_create_failure_is_session_unavailable() {
        let factory = Arc::new(ScriptedFactory {
            fail_create: true,
            ..Default::default()
        });
        let pool = BrowserSessionPool::new(factory, 1);
        let cancel = CancellationToken::new();
        let error = pool
            .navigate_and_render(&url("http://shop.test/"), None, &cancel)
            .await
            .unwrap_err();
        assert_eq!(error.kind, FetchErrorKind::SessionUnavailable);

        assert!(matches!(
            pool.warm_up().await,
            Err(HarvestError::BrowserUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_cookies_round_trip_through_store() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SessionStore::new(dir.path()));
        let factory = Arc::new(ScriptedFactory::default());
        let pool = BrowserSessionPool::new(factory.clone(), 1).with_session_store(store.clone());
        let cancel = CancellationToken::new();
        let target = url("http://shop.test/item/1");

        pool.navigate_and_render(&target, None, &cancel).await.unwrap();
        assert_eq!(store.load("shop.test").await[0].value, "fresh");

        pool.navigate_and_render(&target, None, &cancel).await.unwrap();
        let seen = factory.seen_cookies.lock().unwrap().clone();
        assert!(seen[0].is_empty());
        assert_eq!(seen[1][0].name, "sid");
    }

    #[tokio::test]
    async fn test_pool_serializes_per_session() {
        let factory = Arc::new(ScriptedFactory::default());
        let pool = Arc::new(BrowserSessionPool::new(factory.clone(), 2));
        let cancel = CancellationToken::new();

        let mut handles = Vec::new();
        for i in 0..6 {
            let pool = Arc::clone(&pool);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                pool.navigate_and_render(&url(&format!("http://shop.test/{i}")), None, &cancel)
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(factory.creates.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_cancel_while_rendering() {
        let (_factory, pool) = pool_with(vec![Step::Hang]);
        let pool = pool.with_navigation_timeout(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let error = pool
            .navigate_and_render(&url("http://shop.test/"), None, &cancel)
            .await
            .unwrap_err();
        assert_eq!(error.kind, FetchErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_shutdown_closes_sessions() {
        let (factory, pool) = pool_with(vec![]);
        let cancel = CancellationToken::new();
        pool.navigate_and_render(&url("http://shop.test/"), None, &cancel)
            .await
            .unwrap();
        pool.shutdown().await;
        assert_eq!(factory.shutdowns.load(Ordering::SeqCst), 1);
    }
}

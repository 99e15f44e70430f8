use crate::browser::BrowserSessionPool;
use crate::cache::{CacheEntry, FsCache};
use crate::challenge::{ChallengeDetector, Verdict};
use crate::fetch::http::HttpFetcher;
use crate::fetch::{Document, DocumentOrigin, FetchOptions, PageKind};
use crate::gate::PolitenessGate;
use crate::url::NormalizedUrl;
use crate::{FetchError, FetchErrorKind, FetchResult};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Cache-first fetch pipeline
///
/// Cache lookup, then (under the politeness gate) a lightweight GET and/or a
/// browser render, then challenge classification, then the cache commit.
#[derive(Debug, Clone)]
pub struct Fetcher {
    cache: Arc<FsCache>,
    detector: Arc<ChallengeDetector>,
    browser: Option<Arc<BrowserSessionPool>>,
    http: Option<HttpFetcher>,
}

impl Fetcher {
    pub fn new(cache: Arc<FsCache>, detector: Arc<ChallengeDetector>) -> Self {
        Self {
            cache,
            detector,
            browser: None,
            http: None,
        }
    }

    pub fn with_browser(mut self, pool: Arc<BrowserSessionPool>) -> Self {
        self.browser = Some(pool);
        self
    }

    pub fn with_http(mut self, http: HttpFetcher) -> Self {
        self.http = Some(http);
        self
    }

    pub fn cache(&self) -> &FsCache {
        &self.cache
    }

    pub fn browser(&self) -> Option<&Arc<BrowserSessionPool>> {
        self.browser.as_ref()
    }

    /// Whether any network backend is configured
    pub fn has_network(&self) -> bool {
        self.browser.is_some() || self.http.is_some()
    }

    /// Returns a usable document for `url`
    ///
    /// # Arguments
    ///
    /// * `url` - Page to fetch
    /// * `options` - TTL and fetch-path preferences
    /// * `gate` - Politeness gate every network attempt runs under
    /// * `cancel` - Run-level cancellation token
    ///
    /// # Returns
    ///
    /// * `Ok(Document)` - Fresh cache entry or newly fetched, committed page
    /// * `Err(FetchError)` - `CacheMiss` for cache-only misses, `Challenged`
    ///   when every attempt hit a challenge, or the last network failure
    pub async fn fetch(
        &self,
        url: &NormalizedUrl,
        options: &FetchOptions,
        gate: &PolitenessGate,
        cancel: &CancellationToken,
    ) -> FetchResult<Document> {
        let cached = self.cache.read(url);

        if let Some(entry) = &cached {
            if entry.is_fresh(options.ttl) {
                tracing::debug!(url = %url, "cache hit");
                return Ok(Document::from_entry(url.clone(), entry, DocumentOrigin::Cache));
            }
            tracing::debug!(url = %url, saved_at = %entry.saved_at, "cache entry stale");
        } else if options.skip_network_if_cache_missing {
            return Err(FetchError::new(
                url.as_str(),
                FetchErrorKind::CacheMiss,
                "not cached and network fetch disabled",
            ));
        }

        if !self.has_network() {
            return Err(FetchError::new(
                url.as_str(),
                FetchErrorKind::SessionUnavailable,
                "no fetch backend configured",
            ));
        }

        let this = self;
        let cached = cached.as_ref();
        gate.run(url, cancel, move |attempt| {
            this.fetch_attempt(url, options, cached, attempt, cancel)
        })
        .await
    }

    async fn fetch_attempt(
        &self,
        url: &NormalizedUrl,
        options: &FetchOptions,
        cached: Option<&CacheEntry>,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> FetchResult<Document> {
        tracing::trace!(url = %url, attempt, "fetch attempt");

        let try_lightweight = options.prefer_lightweight_fetch_first || self.browser.is_none();
        if let (true, Some(http)) = (try_lightweight, &self.http) {
            let validators = cached
                .map(|entry| &entry.validators)
                .filter(|validators| !validators.is_empty());

            match http.fetch(url, validators).await {
                Ok(response) if response.not_modified => {
                    if let Some(entry) = cached {
                        return Ok(self.refresh(url, entry));
                    }
                    tracing::debug!(url = %url, "304 without a cached copy");
                }
                Ok(response) => {
                    let document = Document {
                        url: url.clone(),
                        html: response.body,
                        status: response.status,
                        validators: response.validators,
                        origin: DocumentOrigin::Lightweight,
                    };
                    let ready = options
                        .post_load_hook
                        .as_ref()
                        .map_or(true, |hook| hook.satisfied_by_static_html(&document.html));

                    if self.browser.is_none()
                        || (ready && !self.detector.is_challenge(&document, options.page_kind))
                    {
                        return self.settle(document, options.page_kind);
                    }
                    tracing::debug!(url = %url, ready, "lightweight result unusable, rendering in browser");
                }
                Err(error) if self.browser.is_none() || is_transient(error.kind) => {
                    return Err(error);
                }
                Err(error) => {
                    tracing::debug!(url = %url, kind = %error.kind, "lightweight fetch failed, rendering in browser");
                }
            }
        }

        let Some(browser) = &self.browser else {
            return Err(FetchError::new(
                url.as_str(),
                FetchErrorKind::SessionUnavailable,
                "no browser backend configured",
            ));
        };

        let page = browser
            .navigate_and_render(url, options.post_load_hook.as_ref(), cancel)
            .await?;

        self.settle(
            Document {
                url: url.clone(),
                html: page.html,
                status: 200,
                validators: Default::default(),
                origin: DocumentOrigin::Browser,
            },
            options.page_kind,
        )
    }

    /// Stages the cache write, classifies, then commits or rolls back
    fn settle(&self, document: Document, kind: PageKind) -> FetchResult<Document> {
        let staged = match self.cache.stage(
            &document.url,
            &document.html,
            document.status,
            &document.validators,
        ) {
            Ok(staged) => Some(staged),
            Err(e) => {
                tracing::warn!(url = %document.url, error = %e, "could not stage cache write");
                None
            }
        };

        match self.detector.classify(&document, kind) {
            Verdict::Challenge(reason) => {
                if let Some(staged) = staged {
                    staged.discard();
                }
                if let Some(browser) = &self.browser {
                    browser.restart();
                }
                tracing::warn!(url = %document.url, kind = %FetchErrorKind::Challenged, reason = %reason, "challenge page detected");
                Err(
                    FetchError::new(document.url.as_str(), FetchErrorKind::Challenged, reason)
                        .with_status(document.status),
                )
            }
            Verdict::Usable => {
                if let Some(staged) = staged {
                    if let Err(e) = staged.commit() {
                        tracing::warn!(url = %document.url, error = %e, "cache commit failed");
                    }
                }
                Ok(document)
            }
        }
    }

    /// Re-saves an entry the server confirmed unchanged
    fn refresh(&self, url: &NormalizedUrl, entry: &CacheEntry) -> Document {
        if let Err(e) =
            self.cache
                .write(url, &entry.raw_document, entry.http_status, &entry.validators)
        {
            tracing::warn!(url = %url, error = %e, "could not refresh cache entry");
        }
        tracing::debug!(url = %url, "not modified, cache entry refreshed");
        Document::from_entry(url.clone(), entry, DocumentOrigin::Lightweight)
    }
}

/// Failures that should go back to the gate rather than to the browser
fn is_transient(kind: FetchErrorKind) -> bool {
    matches!(
        kind,
        FetchErrorKind::RateLimited
            | FetchErrorKind::ServiceUnavailable
            | FetchErrorKind::Timeout
            | FetchErrorKind::ConnectionRefused
    )
}

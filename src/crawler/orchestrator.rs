//! Crawl orchestration
//!
//! A run moves through three phases:
//! 1. Seeding: seed URLs become multi-page candidates
//! 2. Expanding: listing pages are fetched breadth-first and mined for
//!    further listings and for detail links
//! 3. Harvesting: detail pages are fetched with bounded parallelism and
//!    streamed to the consumer
//!
//! The run lives on its own task; the caller drives it through [`CrawlRun`].

use crate::browser::BrowserSessionPool;
use crate::cache::FsCache;
use crate::challenge::ChallengeDetector;
use crate::crawler::candidate::{CrawlCandidate, FetchedDocument};
use crate::crawler::frontier::Frontier;
use crate::crawler::report::CrawlReport;
use crate::crawler::strategy::LinkStrategy;
use crate::fetch::{Document, DocumentOrigin, FetchOptionsFactory, Fetcher, HttpFetcher};
use crate::gate::{PolitenessGate, PolitenessPolicy};
use crate::url::{normalize_parsed, NormalizedUrl};
use crate::{FetchErrorKind, HarvestError};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

const DEFAULT_DOCUMENT_BUFFER: usize = 16;

/// What to do with candidates on a host that served a challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DegradeMode {
    /// Skip the host for the rest of the run
    #[default]
    Skip,
    /// Serve whatever the cache holds for the host, never the network
    CacheOnly,
}

/// Entry point for crawl runs
///
/// Holds the long-lived collaborators (cache, detector, backends); each call
/// to [`Crawler::crawl`] starts an independent run with its own frontier and
/// politeness gate.
#[derive(Debug, Clone)]
pub struct Crawler {
    fetcher: Fetcher,
    degrade_mode: DegradeMode,
    cancel: CancellationToken,
    document_buffer: usize,
}

impl Crawler {
    pub fn new(cache: Arc<FsCache>, detector: Arc<ChallengeDetector>) -> Self {
        Self {
            fetcher: Fetcher::new(cache, detector),
            degrade_mode: DegradeMode::default(),
            cancel: CancellationToken::new(),
            document_buffer: DEFAULT_DOCUMENT_BUFFER,
        }
    }

    pub fn with_browser(mut self, pool: Arc<BrowserSessionPool>) -> Self {
        self.fetcher = self.fetcher.with_browser(pool);
        self
    }

    pub fn with_http(mut self, http: HttpFetcher) -> Self {
        self.fetcher = self.fetcher.with_http(http);
        self
    }

    pub fn with_degrade_mode(mut self, mode: DegradeMode) -> Self {
        self.degrade_mode = mode;
        self
    }

    /// Cancelling `token` cancels every run started from this crawler
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Documents buffered ahead of a slow consumer
    pub fn with_document_buffer(mut self, size: usize) -> Self {
        self.document_buffer = size.max(1);
        self
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Starts a crawl run
    ///
    /// Only configuration-class problems are reported here; per-candidate
    /// failures are logged and counted in the run's [`CrawlReport`].
    ///
    /// # Arguments
    ///
    /// * `seeds` - Listing pages to start from
    /// * `strategy` - Site-specific link discovery
    /// * `policy` - Politeness rules for this run's gate
    /// * `options` - Fetch options per candidate
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlRun)` - Stream of detail documents plus run control
    /// * `Err(HarvestError)` - No seeds, or an invalid politeness policy
    pub fn crawl<I>(
        &self,
        seeds: I,
        strategy: Arc<dyn LinkStrategy>,
        policy: PolitenessPolicy,
        options: Arc<dyn FetchOptionsFactory>,
    ) -> crate::Result<CrawlRun>
    where
        I: IntoIterator<Item = NormalizedUrl>,
    {
        let seeds: Vec<NormalizedUrl> = seeds.into_iter().collect();
        if seeds.is_empty() {
            return Err(HarvestError::NoSeeds);
        }
        let gate = PolitenessGate::new(policy)?;

        let cancel = self.cancel.child_token();
        let (tx, rx) = mpsc::channel(self.document_buffer);

        tracing::info!(
            seeds = seeds.len(),
            max_global_concurrent = gate.policy().max_global_concurrent,
            degrade_mode = ?self.degrade_mode,
            "starting crawl run"
        );

        let driver = Driver {
            fetcher: self.fetcher.clone(),
            gate,
            strategy,
            options,
            degrade_mode: self.degrade_mode,
            cancel: cancel.clone(),
            tx,
            report: Mutex::new(CrawlReport::default()),
        };
        let handle = tokio::spawn(driver.run(Frontier::new(seeds)));

        Ok(CrawlRun {
            documents: ReceiverStream::new(rx),
            driver: handle,
            cancel,
        })
    }
}

/// A running crawl
///
/// Yields usable detail documents as a [`Stream`]. The stream ends when the
/// frontier is exhausted or the run is cancelled.
pub struct CrawlRun {
    documents: ReceiverStream<FetchedDocument>,
    driver: JoinHandle<CrawlReport>,
    cancel: CancellationToken,
}

impl CrawlRun {
    /// Stops the run at its next blocking point
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits for the run to end and returns its report
    ///
    /// Documents not yet taken from the stream are discarded and the run
    /// stops early; drain the stream first for a complete run.
    pub async fn finish(self) -> crate::Result<CrawlReport> {
        let Self {
            documents, driver, ..
        } = self;
        drop(documents);
        driver
            .await
            .map_err(|e| HarvestError::Driver(e.to_string()))
    }
}

impl Stream for CrawlRun {
    type Item = FetchedDocument;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.documents).poll_next(cx)
    }
}

impl std::fmt::Debug for CrawlRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlRun")
            .field("finished", &self.driver.is_finished())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

struct Driver {
    fetcher: Fetcher,
    gate: PolitenessGate,
    strategy: Arc<dyn LinkStrategy>,
    options: Arc<dyn FetchOptionsFactory>,
    degrade_mode: DegradeMode,
    cancel: CancellationToken,
    tx: mpsc::Sender<FetchedDocument>,
    report: Mutex<CrawlReport>,
}

impl Driver {
    async fn run(self, mut frontier: Frontier) -> CrawlReport {
        let started = Instant::now();

        self.expand(&mut frontier).await;

        let candidates = frontier.take_single_pages();
        tracing::info!(
            listing_pages = self.report().listing_pages,
            candidates = candidates.len(),
            "expansion finished, harvesting"
        );

        let limit = self.gate.policy().max_global_concurrent.max(1);
        let mut harvests = stream::iter(candidates)
            .map(|candidate| self.harvest(candidate))
            .buffer_unordered(limit);
        while harvests.next().await.is_some() {}
        drop(harvests);

        let stopped = self.should_stop();
        let mut report = self
            .report
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        report.cancelled = stopped;
        report.elapsed = started.elapsed();

        tracing::info!(
            documents = report.documents_yielded,
            listing_pages = report.listing_pages,
            cache_hits = report.cache_hits,
            network_fetches = report.network_fetches,
            failures = report.total_failures(),
            degraded = report.is_degraded(),
            cancelled = report.cancelled,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "crawl run finished"
        );
        report
    }

    async fn expand(&self, frontier: &mut Frontier) {
        while let Some(url) = frontier.next_multi_page() {
            if self.should_stop() {
                break;
            }

            let candidate = CrawlCandidate::MultiPage(url);
            let Some(document) = self.fetch_candidate(&candidate).await else {
                continue;
            };
            self.report().listing_pages += 1;

            let current = candidate.url();
            for link in self
                .strategy
                .extract_multi_page_links(current, &document.html)
            {
                match normalize_parsed(link) {
                    Ok(next) => frontier.push_multi_page(next),
                    Err(e) => tracing::debug!(url = %current, error = %e, "dropping listing link"),
                }
            }

            let mut new_details = 0usize;
            for (link, attributes) in self
                .strategy
                .extract_single_page_links(current, &document.html)
            {
                match normalize_parsed(link) {
                    Ok(detail) => {
                        if frontier.push_single_page(detail, attributes) {
                            new_details += 1;
                        }
                    }
                    Err(e) => tracing::debug!(url = %current, error = %e, "dropping detail link"),
                }
            }

            tracing::debug!(
                url = %current,
                new_details,
                pending_listings = frontier.pending_multi_page(),
                "expanded listing page"
            );
        }
    }

    async fn harvest(&self, candidate: CrawlCandidate) {
        if self.should_stop() {
            return;
        }
        let Some(document) = self.fetch_candidate(&candidate).await else {
            return;
        };
        let CrawlCandidate::SinglePage(source_url, seed_attributes) = candidate else {
            return;
        };

        let fetched = FetchedDocument {
            source_url,
            rendered_html: document.html,
            seed_attributes,
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {}
            sent = self.tx.send(fetched) => match sent {
                Ok(()) => self.report().documents_yielded += 1,
                Err(_) => {
                    tracing::debug!("document stream dropped, stopping run");
                    self.cancel.cancel();
                }
            },
        }
    }

    /// Fetches one candidate, folding any failure into the report
    async fn fetch_candidate(&self, candidate: &CrawlCandidate) -> Option<Document> {
        let url = candidate.url();
        let host = url.host();
        let mut options = self
            .options
            .options_for(candidate)
            .for_page(candidate.page_kind());

        if self.report().degraded_hosts.contains(host) {
            match self.degrade_mode {
                DegradeMode::Skip => {
                    tracing::debug!(url = %url, host, "skipping candidate on degraded host");
                    self.report().skipped += 1;
                    return None;
                }
                DegradeMode::CacheOnly => options = options.cache_only(),
            }
        }

        match self.fetcher.fetch(url, &options, &self.gate, &self.cancel).await {
            Ok(document) => {
                let mut report = self.report();
                match document.origin {
                    DocumentOrigin::Cache => report.cache_hits += 1,
                    DocumentOrigin::Lightweight | DocumentOrigin::Browser => {
                        report.network_fetches += 1
                    }
                }
                Some(document)
            }
            Err(error) if error.kind == FetchErrorKind::Cancelled => {
                tracing::debug!(url = %url, "fetch cancelled");
                None
            }
            Err(error) => {
                let mut report = self.report();
                report.record_failure(error.kind);
                if error.kind == FetchErrorKind::Challenged {
                    if report.degraded_hosts.insert(host.to_string()) {
                        tracing::warn!(host, "host degraded for the rest of the run");
                    }
                    if candidate.is_multi_page() {
                        report.listing_degraded = true;
                    }
                }
                drop(report);

                tracing::warn!(
                    url = %url,
                    kind = %error.kind,
                    status = error.status,
                    error = %error.message,
                    "candidate failed"
                );
                None
            }
        }
    }

    fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    fn report(&self) -> MutexGuard<'_, CrawlReport> {
        match self.report.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

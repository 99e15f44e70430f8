use crate::crawler::CrawlCandidate;
use crate::fetch::PageKind;
use scraper::{Html, Selector};
use std::time::Duration;

/// Listing pages change often
pub const LISTING_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Product detail pages rarely change
pub const DETAIL_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// A readiness condition evaluated after the page has loaded
#[derive(Debug, Clone, PartialEq)]
pub enum PostLoadHook {
    /// Wait until the CSS selector matches an element
    WaitForSelector { selector: String, timeout: Duration },
    /// Wait until the JavaScript expression evaluates to `true`
    WaitForScript { expression: String, timeout: Duration },
    /// Give client-side rendering a fixed amount of time
    Settle(Duration),
}

impl PostLoadHook {
    pub fn selector(selector: impl Into<String>, timeout: Duration) -> Self {
        Self::WaitForSelector {
            selector: selector.into(),
            timeout,
        }
    }

    pub fn script(expression: impl Into<String>, timeout: Duration) -> Self {
        Self::WaitForScript {
            expression: expression.into(),
            timeout,
        }
    }

    /// Longest the hook may hold up a render
    pub fn timeout(&self) -> Duration {
        match self {
            Self::WaitForSelector { timeout, .. } | Self::WaitForScript { timeout, .. } => *timeout,
            Self::Settle(delay) => *delay,
        }
    }

    /// Whether HTML fetched without a browser already meets the condition
    ///
    /// Script conditions need a JavaScript engine and are never satisfied
    /// statically.
    pub fn satisfied_by_static_html(&self, html: &str) -> bool {
        match self {
            Self::WaitForSelector { selector, .. } => match Selector::parse(selector) {
                Ok(selector) => Html::parse_document(html).select(&selector).next().is_some(),
                Err(_) => false,
            },
            Self::WaitForScript { .. } => false,
            Self::Settle(_) => true,
        }
    }
}

/// Per-call fetch behavior
///
/// Immutable; derive variants with the builder-style methods.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    /// How long a cached copy counts as fresh
    pub ttl: Duration,

    /// Fail with `CacheMiss` instead of going to the network when nothing is cached
    pub skip_network_if_cache_missing: bool,

    /// Try a plain HTTP GET before starting a browser render
    pub prefer_lightweight_fetch_first: bool,

    pub post_load_hook: Option<PostLoadHook>,

    /// Selects which challenge predicates apply
    pub page_kind: PageKind,
}

impl FetchOptions {
    /// Defaults for multi-page (listing) fetches
    pub fn listing() -> Self {
        Self {
            ttl: LISTING_TTL,
            skip_network_if_cache_missing: false,
            prefer_lightweight_fetch_first: false,
            post_load_hook: None,
            page_kind: PageKind::Listing,
        }
    }

    /// Defaults for single-page (detail) fetches
    pub fn detail() -> Self {
        Self {
            ttl: DETAIL_TTL,
            page_kind: PageKind::Detail,
            ..Self::listing()
        }
    }

    /// Serve whatever is cached, however old, and never touch the network
    pub fn cache_only(self) -> Self {
        Self {
            ttl: Duration::MAX,
            skip_network_if_cache_missing: true,
            ..self
        }
    }

    pub fn with_ttl(self, ttl: Duration) -> Self {
        Self { ttl, ..self }
    }

    pub fn with_hook(self, hook: PostLoadHook) -> Self {
        Self {
            post_load_hook: Some(hook),
            ..self
        }
    }

    pub fn for_page(self, page_kind: PageKind) -> Self {
        Self { page_kind, ..self }
    }

    pub fn lightweight_first(self, enabled: bool) -> Self {
        Self {
            prefer_lightweight_fetch_first: enabled,
            ..self
        }
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::listing()
    }
}

/// Chooses fetch options for each crawl candidate
pub trait FetchOptionsFactory: Send + Sync {
    fn options_for(&self, candidate: &CrawlCandidate) -> FetchOptions;
}

impl<F> FetchOptionsFactory for F
where
    F: Fn(&CrawlCandidate) -> FetchOptions + Send + Sync,
{
    fn options_for(&self, candidate: &CrawlCandidate) -> FetchOptions {
        self(candidate)
    }
}

/// One set of options for listings, another for details
#[derive(Debug, Clone, Default)]
pub struct DefaultFetchOptions {
    pub listing: FetchOptions,
    pub detail: FetchOptions,
}

impl DefaultFetchOptions {
    pub fn new(listing: FetchOptions, detail: FetchOptions) -> Self {
        Self { listing, detail }
    }

    pub fn standard() -> Self {
        Self::new(FetchOptions::listing(), FetchOptions::detail())
    }
}

impl FetchOptionsFactory for DefaultFetchOptions {
    fn options_for(&self, candidate: &CrawlCandidate) -> FetchOptions {
        match candidate {
            CrawlCandidate::MultiPage(_) => self.listing.clone(),
            CrawlCandidate::SinglePage(..) => self.detail.clone(),
        }
    }
}

use crate::browser::ChromeOptions;
use crate::challenge::{ChallengeDetector, MarkerText, MissingContainer};
use crate::crawler::{DegradeMode, SelectorLinkStrategy};
use crate::fetch::{DefaultFetchOptions, FetchOptions, PostLoadHook, DEFAULT_USER_AGENT};
use crate::gate::{default_retry_on, HostOverride, PolitenessPolicy};
use crate::{ConfigError, FetchErrorKind};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Catalog-Harvest
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub politeness: PolitenessConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default, rename = "site")]
    pub sites: Vec<SiteConfig>,
}

/// Crawl behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// What to do with a host after it serves a challenge
    #[serde(rename = "degrade-mode", default)]
    pub degrade_mode: DegradeMode,

    /// How long a cached listing page stays fresh (hours)
    #[serde(rename = "listing-ttl-hours", default = "default_listing_ttl_hours")]
    pub listing_ttl_hours: u64,

    /// How long a cached detail page stays fresh (days)
    #[serde(rename = "detail-ttl-days", default = "default_detail_ttl_days")]
    pub detail_ttl_days: u64,

    /// Try a plain HTTP GET before rendering in the browser
    #[serde(rename = "lightweight-first", default = "default_true")]
    pub lightweight_first: bool,

    /// User-Agent for the lightweight path and the browser
    #[serde(rename = "user-agent", default)]
    pub user_agent: Option<String>,

    /// Whole-request timeout for the lightweight path (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Documents buffered ahead of the output writer
    #[serde(rename = "document-buffer", default = "default_document_buffer")]
    pub document_buffer: usize,
}

/// Politeness gate configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PolitenessConfig {
    #[serde(rename = "max-global-concurrent", default = "default_global_concurrent")]
    pub max_global_concurrent: usize,

    #[serde(rename = "max-per-host-concurrent", default = "default_per_host_concurrent")]
    pub max_per_host_concurrent: usize,

    /// Minimum time between requests to the same host (milliseconds)
    #[serde(rename = "min-delay-ms", default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(rename = "base-backoff-ms", default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    #[serde(rename = "max-jitter-ms", default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,

    /// Failure kinds that are retried
    #[serde(rename = "retry-on", default = "default_retry_on")]
    pub retry_on: BTreeSet<FetchErrorKind>,

    #[serde(rename = "override", default)]
    pub overrides: Vec<HostOverrideConfig>,
}

/// Per-host politeness adjustment
#[derive(Debug, Clone, Deserialize)]
pub struct HostOverrideConfig {
    /// Host pattern (e.g., "shop.example.com" or "*.example.com")
    pub host: String,

    #[serde(rename = "max-concurrent", default)]
    pub max_concurrent: Option<usize>,

    #[serde(rename = "min-delay-ms", default)]
    pub min_delay_ms: Option<u64>,

    #[serde(rename = "max-retries", default)]
    pub max_retries: Option<u32>,
}

/// Fetch cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Directory holding cached documents
    #[serde(default = "default_cache_root")]
    pub root: PathBuf,
}

/// Session store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Directory holding per-host cookie files
    #[serde(default = "default_session_root")]
    pub root: PathBuf,
}

/// Browser backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    /// Render pages in Chromium; lightweight fetches only when false
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(rename = "pool-size", default = "default_pool_size")]
    pub pool_size: usize,

    #[serde(default = "default_true")]
    pub headless: bool,

    /// Path to the Chromium binary
    #[serde(default)]
    pub executable: Option<PathBuf>,

    /// DevTools websocket URL of a running browser
    #[serde(rename = "remote-endpoint", default)]
    pub remote_endpoint: Option<String>,

    #[serde(rename = "navigation-timeout-secs", default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,
}

/// One site to crawl
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub name: String,

    /// Listing URLs to start from
    pub seeds: Vec<String>,

    /// Links to further listing/pagination pages
    #[serde(rename = "listing-selector", default)]
    pub listing_selector: Option<String>,

    /// Links to detail pages
    #[serde(rename = "detail-selector")]
    pub detail_selector: String,

    /// Element wrapping one product on a listing page
    #[serde(rename = "item-selector", default)]
    pub item_selector: Option<String>,

    /// Seed attributes read from each item (`selector@attribute` or `selector`)
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    /// Wait for this selector after load before capturing HTML
    #[serde(rename = "ready-selector", default)]
    pub ready_selector: Option<String>,

    #[serde(rename = "ready-timeout-ms", default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,

    /// A detail page without this element is treated as a challenge
    #[serde(rename = "required-container", default)]
    pub required_container: Option<String>,

    /// Extra challenge marker texts for this site
    #[serde(rename = "challenge-markers", default)]
    pub challenge_markers: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_listing_ttl_hours() -> u64 {
    12
}

fn default_detail_ttl_days() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_document_buffer() -> usize {
    16
}

fn default_global_concurrent() -> usize {
    4
}

fn default_per_host_concurrent() -> usize {
    1
}

fn default_min_delay_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    500
}

fn default_max_jitter_ms() -> u64 {
    250
}

fn default_cache_root() -> PathBuf {
    PathBuf::from("./harvest-cache")
}

fn default_session_root() -> PathBuf {
    PathBuf::from("./harvest-sessions")
}

fn default_pool_size() -> usize {
    1
}

fn default_navigation_timeout_secs() -> u64 {
    30
}

fn default_ready_timeout_ms() -> u64 {
    10_000
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            degrade_mode: DegradeMode::default(),
            listing_ttl_hours: default_listing_ttl_hours(),
            detail_ttl_days: default_detail_ttl_days(),
            lightweight_first: true,
            user_agent: None,
            request_timeout_secs: default_request_timeout_secs(),
            document_buffer: default_document_buffer(),
        }
    }
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            max_global_concurrent: default_global_concurrent(),
            max_per_host_concurrent: default_per_host_concurrent(),
            min_delay_ms: default_min_delay_ms(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_jitter_ms: default_max_jitter_ms(),
            retry_on: default_retry_on(),
            overrides: Vec::new(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: default_cache_root(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            root: default_session_root(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pool_size: default_pool_size(),
            headless: true,
            executable: None,
            remote_endpoint: None,
            navigation_timeout_secs: default_navigation_timeout_secs(),
        }
    }
}

impl CrawlerConfig {
    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Listing TTL; absurdly large values saturate instead of overflowing
    pub fn listing_ttl(&self) -> Duration {
        Duration::from_secs(self.listing_ttl_hours.saturating_mul(60 * 60))
    }

    pub fn detail_ttl(&self) -> Duration {
        Duration::from_secs(self.detail_ttl_days.saturating_mul(24 * 60 * 60))
    }
}

impl PolitenessConfig {
    /// Converts the configured values into a gate policy
    pub fn to_policy(&self) -> PolitenessPolicy {
        PolitenessPolicy {
            max_global_concurrent: self.max_global_concurrent,
            max_per_host_concurrent: self.max_per_host_concurrent,
            min_delay_per_host: Duration::from_millis(self.min_delay_ms),
            max_retries: self.max_retries,
            base_backoff: Duration::from_millis(self.base_backoff_ms),
            max_jitter: Duration::from_millis(self.max_jitter_ms),
            retry_on: self.retry_on.clone(),
            overrides: self
                .overrides
                .iter()
                .map(|o| HostOverride {
                    pattern: o.host.clone(),
                    max_concurrent: o.max_concurrent,
                    min_delay: o.min_delay_ms.map(Duration::from_millis),
                    max_retries: o.max_retries,
                })
                .collect(),
        }
    }
}

impl BrowserConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn chrome_options(&self, user_agent: Option<&str>) -> ChromeOptions {
        ChromeOptions {
            headless: self.headless,
            executable: self.executable.clone(),
            remote_endpoint: self.remote_endpoint.clone(),
            user_agent: user_agent.map(str::to_string),
            request_timeout: self.navigation_timeout(),
        }
    }
}

impl SiteConfig {
    /// Builds the link strategy described by this site's selectors
    pub fn link_strategy(&self) -> Result<SelectorLinkStrategy, ConfigError> {
        let mut strategy = SelectorLinkStrategy::new(&self.detail_selector)?;
        if let Some(listing) = &self.listing_selector {
            strategy = strategy.with_listing_selector(listing)?;
        }
        if let Some(item) = &self.item_selector {
            strategy = strategy.with_item_container(item)?;
        }
        for (name, rule) in &self.attributes {
            strategy = strategy.with_attribute(name, rule)?;
        }
        Ok(strategy)
    }

    /// Default predicates plus this site's markers and required container
    pub fn challenge_detector(&self) -> Result<ChallengeDetector, ConfigError> {
        let mut detector = ChallengeDetector::with_defaults();
        if !self.challenge_markers.is_empty() {
            detector = detector.with_predicate(MarkerText::new(&self.challenge_markers));
        }
        if let Some(container) = &self.required_container {
            detector = detector.with_detail_predicate(MissingContainer::new(container)?);
        }
        Ok(detector)
    }

    pub fn post_load_hook(&self) -> Option<PostLoadHook> {
        self.ready_selector.as_ref().map(|selector| {
            PostLoadHook::selector(selector.clone(), Duration::from_millis(self.ready_timeout_ms))
        })
    }
}

impl Config {
    /// Listing and detail fetch options for `site`
    pub fn fetch_options(&self, site: &SiteConfig) -> DefaultFetchOptions {
        let listing = FetchOptions::listing()
            .with_ttl(self.crawler.listing_ttl())
            .lightweight_first(self.crawler.lightweight_first);
        let mut detail = FetchOptions::detail()
            .with_ttl(self.crawler.detail_ttl())
            .lightweight_first(self.crawler.lightweight_first);
        if let Some(hook) = site.post_load_hook() {
            detail = detail.with_hook(hook);
        }
        DefaultFetchOptions::new(listing, detail)
    }

    /// Looks up a site by name
    pub fn site(&self, name: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|site| site.name == name)
    }
}

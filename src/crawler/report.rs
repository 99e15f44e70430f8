use crate::FetchErrorKind;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// What happened during one crawl run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// Listing pages fetched and expanded
    pub listing_pages: u64,

    /// Detail documents handed to the consumer
    pub documents_yielded: u64,

    /// Candidates served from a fresh cache entry
    pub cache_hits: u64,

    /// Candidates that needed the network
    pub network_fetches: u64,

    /// Candidates that ultimately failed as challenge pages
    pub challenges: u64,

    /// Failed candidates by failure kind
    pub failures: BTreeMap<FetchErrorKind, u64>,

    /// Candidates skipped because their host was degraded
    pub skipped: u64,

    /// Hosts that served a challenge during the run
    pub degraded_hosts: BTreeSet<String>,

    /// A listing page was challenged, so expansion may be incomplete
    pub listing_degraded: bool,

    pub cancelled: bool,

    pub elapsed: Duration,
}

impl CrawlReport {
    pub fn record_failure(&mut self, kind: FetchErrorKind) {
        *self.failures.entry(kind).or_insert(0) += 1;
        if kind == FetchErrorKind::Challenged {
            self.challenges += 1;
        }
    }

    pub fn total_failures(&self) -> u64 {
        self.failures.values().sum()
    }

    /// The run finished, but with less coverage than a clean run
    pub fn is_degraded(&self) -> bool {
        self.listing_degraded || !self.degraded_hosts.is_empty()
    }
}

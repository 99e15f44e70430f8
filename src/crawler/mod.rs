//! Crawler module
//!
//! This module contains the crawl engine proper:
//! - Crawl candidates and yielded documents
//! - Pluggable link extraction strategies
//! - The per-run frontier with its seen set
//! - The orchestrator that drives a run and streams results
//! - The end-of-run report

mod candidate;
mod frontier;
mod orchestrator;
mod report;
mod strategy;

pub use candidate::{CrawlCandidate, FetchedDocument, SeedAttributes};
pub use frontier::Frontier;
pub use orchestrator::{CrawlRun, Crawler, DegradeMode};
pub use report::CrawlReport;
pub use strategy::{LinkStrategy, SelectorLinkStrategy};

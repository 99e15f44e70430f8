use crate::crawler::candidate::{CrawlCandidate, SeedAttributes};
use crate::url::NormalizedUrl;
use std::collections::{HashSet, VecDeque};

/// Work queues and the seen set for one crawl run
///
/// Multi-page URLs are expanded breadth-first. Single-page URLs are held in
/// discovery order; the first discovery of a URL keeps its seed attributes.
/// A URL is fetched at most once per run.
#[derive(Debug, Default)]
pub struct Frontier {
    multi_page: VecDeque<NormalizedUrl>,
    single_page: Vec<(NormalizedUrl, SeedAttributes)>,
    discovered: HashSet<NormalizedUrl>,
    seen: HashSet<NormalizedUrl>,
}

impl Frontier {
    pub fn new(seeds: impl IntoIterator<Item = NormalizedUrl>) -> Self {
        let mut frontier = Self::default();
        for seed in seeds {
            frontier.push_multi_page(seed);
        }
        frontier
    }

    pub fn push_multi_page(&mut self, url: NormalizedUrl) {
        if !self.seen.contains(&url) {
            self.multi_page.push_back(url);
        }
    }

    /// Queues a detail page; returns false if it was already known
    pub fn push_single_page(&mut self, url: NormalizedUrl, attributes: SeedAttributes) -> bool {
        if self.seen.contains(&url) || !self.discovered.insert(url.clone()) {
            return false;
        }
        self.single_page.push((url, attributes));
        true
    }

    /// Pops the next unseen multi-page URL and marks it seen
    pub fn next_multi_page(&mut self) -> Option<NormalizedUrl> {
        while let Some(url) = self.multi_page.pop_front() {
            if self.seen.insert(url.clone()) {
                return Some(url);
            }
        }
        None
    }

    /// Drains every pending detail page not yet seen, marking each seen
    pub fn take_single_pages(&mut self) -> Vec<CrawlCandidate> {
        let pending = std::mem::take(&mut self.single_page);
        pending
            .into_iter()
            .filter(|(url, _)| self.seen.insert(url.clone()))
            .map(|(url, attributes)| CrawlCandidate::SinglePage(url, attributes))
            .collect()
    }

    pub fn is_seen(&self, url: &NormalizedUrl) -> bool {
        self.seen.contains(url)
    }

    pub fn pending_multi_page(&self) -> usize {
        self.multi_page.len()
    }

    pub fn pending_single_page(&self) -> usize {
        self.single_page.len()
    }

    /// Both queues are empty
    pub fn is_exhausted(&self) -> bool {
        self.multi_page.is_empty() && self.single_page.is_empty()
    }
}

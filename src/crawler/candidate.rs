use crate::fetch::PageKind;
use crate::url::NormalizedUrl;
use std::collections::BTreeMap;

/// Values scraped from a listing page alongside a detail link
///
/// Carried through to the yielded document so the record extractor sees
/// data (thumbnail, listing price, ...) that only the listing shows.
pub type SeedAttributes = BTreeMap<String, String>;

/// A URL the orchestrator intends to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlCandidate {
    /// Listing or pagination page; expanded for further links
    MultiPage(NormalizedUrl),
    /// Detail page; fetched and yielded
    SinglePage(NormalizedUrl, SeedAttributes),
}

impl CrawlCandidate {
    pub fn url(&self) -> &NormalizedUrl {
        match self {
            Self::MultiPage(url) | Self::SinglePage(url, _) => url,
        }
    }

    pub fn is_multi_page(&self) -> bool {
        matches!(self, Self::MultiPage(_))
    }

    pub fn page_kind(&self) -> PageKind {
        match self {
            Self::MultiPage(_) => PageKind::Listing,
            Self::SinglePage(..) => PageKind::Detail,
        }
    }
}

/// A usable detail page handed to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    pub source_url: NormalizedUrl,
    pub rendered_html: String,
    pub seed_attributes: SeedAttributes,
}

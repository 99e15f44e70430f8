//! Challenge detection
//!
//! Decides whether a fetched document is real content or an anti-bot
//! interstitial. Classification is a pure function of the document; what to
//! do about a challenge (roll back the cache write, restart the browser,
//! degrade the host) is up to the caller.

mod predicates;

pub use predicates::{
    BlockingStatus, ChallengePredicate, EmptyBody, MarkerText, MissingContainer, DEFAULT_MARKERS,
};

use crate::fetch::{Document, PageKind};

/// Outcome of classifying a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Usable,
    Challenge(String),
}

impl Verdict {
    pub fn is_challenge(&self) -> bool {
        matches!(self, Self::Challenge(_))
    }
}

/// Ordered set of challenge predicates; the first hit decides
///
/// Detail-only predicates describe what a real product page must look like
/// and are skipped for listing pages.
#[derive(Debug, Default)]
pub struct ChallengeDetector {
    predicates: Vec<Box<dyn ChallengePredicate>>,
    detail_predicates: Vec<Box<dyn ChallengePredicate>>,
}

impl ChallengeDetector {
    /// A detector that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty body, default markers, and blocking statuses
    pub fn with_defaults() -> Self {
        Self::new()
            .with_predicate(EmptyBody)
            .with_predicate(BlockingStatus::default())
            .with_predicate(MarkerText::defaults())
    }

    pub fn with_predicate(mut self, predicate: impl ChallengePredicate + 'static) -> Self {
        self.predicates.push(Box::new(predicate));
        self
    }

    /// Adds a predicate consulted for detail pages only
    pub fn with_detail_predicate(mut self, predicate: impl ChallengePredicate + 'static) -> Self {
        self.detail_predicates.push(Box::new(predicate));
        self
    }

    pub fn push(&mut self, predicate: Box<dyn ChallengePredicate>) {
        self.predicates.push(predicate);
    }

    pub fn len(&self) -> usize {
        self.predicates.len() + self.detail_predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty() && self.detail_predicates.is_empty()
    }

    pub fn classify(&self, document: &Document, kind: PageKind) -> Verdict {
        let detail_only: &[Box<dyn ChallengePredicate>] = match kind {
            PageKind::Detail => self.detail_predicates.as_slice(),
            PageKind::Listing => &[],
        };
        for predicate in self.predicates.iter().chain(detail_only) {
            if let Some(reason) = predicate.check(document) {
                tracing::debug!(
                    url = %document.url,
                    predicate = predicate.name(),
                    reason = %reason,
                    "challenge detected"
                );
                return Verdict::Challenge(format!("{}: {}", predicate.name(), reason));
            }
        }
        Verdict::Usable
    }

    pub fn is_challenge(&self, document: &Document, kind: PageKind) -> bool {
        self.classify(document, kind).is_challenge()
    }
}

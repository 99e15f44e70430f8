use crate::fetch::Document;
use crate::ConfigError;
use scraper::{Html, Selector};
use std::fmt;

/// Markers that show up on common anti-bot interstitials
///
/// Only text specific to interstitials belongs here; widget class names such
/// as `g-recaptcha` also appear in review and newsletter forms on real pages.
pub const DEFAULT_MARKERS: &[&str] = &[
    "verify you are human",
    "checking your browser",
    "please wait while we",
    "are you a robot",
    "captcha-container",
    "cf-browser-verification",
    "cf-challenge",
    "unusual traffic",
];

/// One rule for recognizing a challenge page
///
/// Implementations must be pure: the same document always gets the same
/// answer.
pub trait ChallengePredicate: Send + Sync + fmt::Debug {
    /// Short name used in logs and verdict reasons
    fn name(&self) -> &str;

    /// Returns the reason if `document` looks like a challenge
    fn check(&self, document: &Document) -> Option<String>;
}

/// Flags documents with no content at all
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyBody;

impl ChallengePredicate for EmptyBody {
    fn name(&self) -> &str {
        "empty-body"
    }

    fn check(&self, document: &Document) -> Option<String> {
        document
            .html
            .trim()
            .is_empty()
            .then(|| "document body is empty".to_string())
    }
}

/// Flags documents containing any known marker text, case-insensitively
#[derive(Debug, Clone)]
pub struct MarkerText {
    markers: Vec<String>,
}

impl MarkerText {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    pub fn defaults() -> Self {
        Self::new(DEFAULT_MARKERS)
    }
}

impl ChallengePredicate for MarkerText {
    fn name(&self) -> &str {
        "marker-text"
    }

    fn check(&self, document: &Document) -> Option<String> {
        let haystack = document.html.to_lowercase();
        self.markers
            .iter()
            .find(|marker| haystack.contains(marker.as_str()))
            .map(|marker| format!("found challenge marker '{marker}'"))
    }
}

/// Flags documents that lack the container every real page of a site has
#[derive(Debug, Clone)]
pub struct MissingContainer {
    raw: String,
    selector: Selector,
}

impl MissingContainer {
    pub fn new(selector: &str) -> Result<Self, ConfigError> {
        let parsed = Selector::parse(selector)
            .map_err(|e| ConfigError::InvalidSelector(format!("{selector}: {e}")))?;
        Ok(Self {
            raw: selector.to_string(),
            selector: parsed,
        })
    }
}

impl ChallengePredicate for MissingContainer {
    fn name(&self) -> &str {
        "missing-container"
    }

    fn check(&self, document: &Document) -> Option<String> {
        let html = Html::parse_document(&document.html);
        if html.select(&self.selector).next().is_some() {
            None
        } else {
            Some(format!("expected container '{}' is absent", self.raw))
        }
    }
}

/// Flags bodies served with a status destinations use to block robots
#[derive(Debug, Clone)]
pub struct BlockingStatus {
    statuses: Vec<u16>,
}

impl BlockingStatus {
    pub fn new(statuses: impl Into<Vec<u16>>) -> Self {
        Self {
            statuses: statuses.into(),
        }
    }
}

impl Default for BlockingStatus {
    fn default() -> Self {
        Self::new([401, 403, 429])
    }
}

impl ChallengePredicate for BlockingStatus {
    fn name(&self) -> &str {
        "blocking-status"
    }

    fn check(&self, document: &Document) -> Option<String> {
        self.statuses
            .contains(&document.status)
            .then(|| format!("served with blocking status {}", document.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::DocumentOrigin;
    use crate::url::NormalizedUrl;

    fn doc(html: &str, status: u16) -> Document {
        Document::new(
            NormalizedUrl::parse("http://shop.test/item/1").unwrap(),
            html,
            status,
            DocumentOrigin::Lightweight,
        )
    }

    #[test]
    fn test_empty_body() {
        assert!(EmptyBody.check(&doc("   \n", 200)).is_some());
        assert!(EmptyBody.check(&doc("<p>hi</p>", 200)).is_none());
    }

    #[test]
    fn test_marker_text_is_case_insensitive() {
        let predicate = MarkerText::new(["Verify you are human"]);
        let reason = predicate
            .check(&doc("<h1>VERIFY YOU ARE HUMAN</h1>", 200))
            .unwrap();
        assert!(reason.contains("verify you are human"));
        assert!(predicate.check(&doc("<h1>Widget 3000</h1>", 200)).is_none());
    }

    #[test]
    fn test_default_markers_accept_page_with_captcha_form() {
        let page = r#"<div class="product">Widget 3000</div>
            <form id="review"><div class="g-recaptcha" data-sitekey="k"></div></form>
            <p>Access denied to members-only pricing? Sign in.</p>"#;
        assert!(MarkerText::defaults().check(&doc(page, 200)).is_none());
        assert!(MarkerText::defaults()
            .check(&doc("<p>Checking your browser before accessing</p>", 200))
            .is_some());
    }

    #[test]
    fn test_marker_text_ignores_blank_markers() {
        let predicate = MarkerText::new(["", "  "]);
        assert!(predicate.check(&doc("<p>anything</p>", 200)).is_none());
    }

    #[test]
    fn test_missing_container() {
        let predicate = MissingContainer::new("#product").unwrap();
        assert!(predicate
            .check(&doc("<div id=\"product\">x</div>", 200))
            .is_none());
        assert!(predicate.check(&doc("<div>interstitial</div>", 200)).is_some());
    }

    #[test]
    fn test_missing_container_rejects_bad_selector() {
        assert!(MissingContainer::new("##").is_err());
    }

    #[test]
    fn test_blocking_status() {
        let predicate = BlockingStatus::default();
        assert!(predicate.check(&doc("<p>no</p>", 403)).is_some());
        assert!(predicate.check(&doc("<p>ok</p>", 200)).is_none());
    }
}

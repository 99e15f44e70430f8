//! Link extraction strategies
//!
//! The orchestrator knows nothing about a site's markup; a [`LinkStrategy`]
//! tells it which links on a page lead to more listings and which lead to
//! detail pages.

use crate::crawler::candidate::SeedAttributes;
use crate::url::NormalizedUrl;
use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Site-specific link discovery
pub trait LinkStrategy: Send + Sync {
    /// Links to further listing/pagination pages
    fn extract_multi_page_links(&self, current: &NormalizedUrl, document: &str) -> Vec<Url>;

    /// Links to detail pages, each with the attributes seen next to it
    fn extract_single_page_links(
        &self,
        current: &NormalizedUrl,
        document: &str,
    ) -> Vec<(Url, SeedAttributes)>;
}

/// How one seed attribute is read from an item container
#[derive(Debug, Clone)]
struct AttributeRule {
    name: String,
    selector: Selector,
    /// HTML attribute to read; the element's text when None
    attribute: Option<String>,
}

/// CSS-selector driven [`LinkStrategy`]
///
/// Attribute rules use `selector@attribute` syntax (`img.thumb@src`); a rule
/// without `@` reads the element's text.
#[derive(Debug, Clone)]
pub struct SelectorLinkStrategy {
    listing: Option<Selector>,
    detail: Selector,
    item_container: Option<Selector>,
    attributes: Vec<AttributeRule>,
}

fn parse_selector(raw: &str) -> Result<Selector, ConfigError> {
    Selector::parse(raw).map_err(|e| ConfigError::InvalidSelector(format!("{raw}: {e}")))
}

impl SelectorLinkStrategy {
    /// Creates a strategy that follows `detail_selector` links to detail pages
    pub fn new(detail_selector: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            listing: None,
            detail: parse_selector(detail_selector)?,
            item_container: None,
            attributes: Vec::new(),
        })
    }

    /// Follows `selector` links as further listing pages
    pub fn with_listing_selector(mut self, selector: &str) -> Result<Self, ConfigError> {
        self.listing = Some(parse_selector(selector)?);
        Ok(self)
    }

    /// Scopes detail links and attributes to each matching item element
    pub fn with_item_container(mut self, selector: &str) -> Result<Self, ConfigError> {
        self.item_container = Some(parse_selector(selector)?);
        Ok(self)
    }

    /// Adds a seed attribute read from within each item container
    pub fn with_attribute(mut self, name: &str, rule: &str) -> Result<Self, ConfigError> {
        let (selector, attribute) = match rule.rsplit_once('@') {
            Some((selector, attribute)) if !attribute.is_empty() => {
                (selector, Some(attribute.to_string()))
            }
            _ => (rule, None),
        };
        self.attributes.push(AttributeRule {
            name: name.to_string(),
            selector: parse_selector(selector)?,
            attribute,
        });
        Ok(self)
    }

    fn read_attributes(&self, item: ElementRef<'_>) -> SeedAttributes {
        let mut attributes = SeedAttributes::new();
        for rule in &self.attributes {
            let Some(element) = item.select(&rule.selector).next() else {
                continue;
            };
            let value = match &rule.attribute {
                Some(attribute) => element.value().attr(attribute).map(str::to_string),
                None => Some(element.text().collect::<String>()),
            };
            if let Some(value) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
                attributes.insert(rule.name.clone(), value);
            }
        }
        attributes
    }
}

impl LinkStrategy for SelectorLinkStrategy {
    fn extract_multi_page_links(&self, current: &NormalizedUrl, document: &str) -> Vec<Url> {
        let Some(listing) = &self.listing else {
            return Vec::new();
        };
        let html = Html::parse_document(document);
        html.select(listing)
            .filter_map(|element| element.value().attr("href"))
            .filter_map(|href| resolve_link(href, current.as_url()))
            .collect()
    }

    fn extract_single_page_links(
        &self,
        current: &NormalizedUrl,
        document: &str,
    ) -> Vec<(Url, SeedAttributes)> {
        let html = Html::parse_document(document);
        let base = current.as_url();

        match &self.item_container {
            Some(container) => html
                .select(container)
                .filter_map(|item| {
                    let href = item
                        .select(&self.detail)
                        .find_map(|link| link.value().attr("href"))?;
                    let url = resolve_link(href, base)?;
                    Some((url, self.read_attributes(item)))
                })
                .collect(),
            None => html
                .select(&self.detail)
                .filter_map(|link| link.value().attr("href"))
                .filter_map(|href| resolve_link(href, base))
                .map(|url| (url, SeedAttributes::new()))
                .collect(),
        }
    }
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    matches!(absolute.scheme(), "http" | "https").then_some(absolute)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <ul>
            <li class="item"><a class="detail" href="/item/42">Widget</a><img class="thumb" src="x.jpg"></li>
            <li class="item"><a class="detail" href="/item/43">Gadget</a><span class="price"> 9.99 </span></li>
            <li class="item"><span>no link here</span></li>
          </ul>
          <a class="next" href="?page=2">Next</a>
          <a class="next" href="javascript:void(0)">Broken</a>
        </body></html>
    "#;

    fn current() -> NormalizedUrl {
        NormalizedUrl::parse("http://shop.test/list?page=1").unwrap()
    }

    fn strategy() -> SelectorLinkStrategy {
        SelectorLinkStrategy::new("a.detail")
            .unwrap()
            .with_listing_selector("a.next")
            .unwrap()
            .with_item_container("li.item")
            .unwrap()
            .with_attribute("img", "img.thumb@src")
            .unwrap()
            .with_attribute("price", ".price")
            .unwrap()
    }

    #[test]
    fn test_multi_page_links_resolved_against_current() {
        let links = strategy().extract_multi_page_links(&current(), LISTING);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].as_str(), "http://shop.test/list?page=2");
    }

    #[test]
    fn test_single_page_links_carry_attributes() {
        let links = strategy().extract_single_page_links(&current(), LISTING);
        assert_eq!(links.len(), 2);

        let (url, attrs) = &links[0];
        assert_eq!(url.as_str(), "http://shop.test/item/42");
        assert_eq!(attrs.get("img").map(String::as_str), Some("x.jpg"));
        assert!(!attrs.contains_key("price"));

        let (url, attrs) = &links[1];
        assert_eq!(url.as_str(), "http://shop.test/item/43");
        assert_eq!(attrs.get("price").map(String::as_str), Some("9.99"));
        assert!(!attrs.contains_key("img"));
    }

    #[test]
    fn test_without_container_links_have_no_attributes() {
        let strategy = SelectorLinkStrategy::new("a.detail").unwrap();
        let links = strategy.extract_single_page_links(&current(), LISTING);
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|(_, attrs)| attrs.is_empty()));
        assert!(strategy
            .extract_multi_page_links(&current(), LISTING)
            .is_empty());
    }

    #[test]
    fn test_invalid_selector_is_config_error() {
        assert!(matches!(
            SelectorLinkStrategy::new("a[["),
            Err(ConfigError::InvalidSelector(_))
        ));
    }

    #[test]
    fn test_resolve_link_filters_schemes() {
        let base = Url::parse("https://shop.test/list").unwrap();
        assert!(resolve_link("mailto:a@b.c", &base).is_none());
        assert!(resolve_link("JavaScript:alert(1)", &base).is_none());
        assert!(resolve_link("#top", &base).is_none());
        assert!(resolve_link("ftp://shop.test/file", &base).is_none());
        assert_eq!(
            resolve_link("item/1", &base).unwrap().as_str(),
            "https://shop.test/item/1"
        );
    }
}

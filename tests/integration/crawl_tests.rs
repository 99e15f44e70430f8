//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and drive whole
//! crawl runs over the lightweight fetch path.

use catalog_harvest::cache::Validators;
use catalog_harvest::challenge::ChallengeDetector;
use catalog_harvest::config::load_config;
use catalog_harvest::crawler::{DegradeMode, SelectorLinkStrategy};
use catalog_harvest::fetch::{DefaultFetchOptions, FetchOptions, HttpFetcher, DEFAULT_USER_AGENT};
use catalog_harvest::output::{DocumentSink, JsonLinesSink};
use catalog_harvest::{
    normalize_url, CrawlReport, CrawlRun, Crawler, FetchErrorKind, FetchedDocument, FsCache,
    HarvestError, NormalizedUrl, PolitenessPolicy,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGE_ONE: &str = r#"<html><body>
<ul>
  <li class="item"><a class="detail" href="/item/42">Widget</a><img src="x.jpg"></li>
</ul>
<a class="next" href="/list?page=2">next</a>
</body></html>"#;

const PAGE_TWO: &str = r#"<html><body>
<ul>
  <li class="item"><a class="detail" href="/item/43">Gadget</a></li>
</ul>
<a class="next" href="/list?page=1">first</a>
</body></html>"#;

const CHALLENGE: &str = "<html><body>Please verify you are human</body></html>";

fn detail_page(id: u32) -> String {
    format!("<html><body><div class=\"product\">Product {}</div></body></html>", id)
}

/// Policy with no pacing so tests run quickly
fn fast_policy() -> PolitenessPolicy {
    PolitenessPolicy {
        min_delay_per_host: Duration::ZERO,
        base_backoff: Duration::from_millis(1),
        max_jitter: Duration::ZERO,
        max_retries: 1,
        ..Default::default()
    }
}

fn strategy() -> Arc<SelectorLinkStrategy> {
    Arc::new(
        SelectorLinkStrategy::new("a.detail")
            .unwrap()
            .with_listing_selector("a.next")
            .unwrap()
            .with_item_container("li.item")
            .unwrap()
            .with_attribute("img", "img@src")
            .unwrap(),
    )
}

fn crawler(cache: Arc<FsCache>) -> Crawler {
    let http = HttpFetcher::new(DEFAULT_USER_AGENT, Duration::from_secs(5)).unwrap();
    Crawler::new(cache, Arc::new(ChallengeDetector::with_defaults())).with_http(http)
}

fn url(server: &MockServer, path: &str) -> NormalizedUrl {
    normalize_url(&format!("{}{}", server.uri(), path)).unwrap()
}

async fn mount_listing(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAGE_ONE))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAGE_TWO))
        .expect(1)
        .mount(server)
        .await;
}

async fn drain(mut run: CrawlRun) -> (Vec<FetchedDocument>, CrawlReport) {
    let mut documents = Vec::new();
    while let Some(document) = run.next().await {
        documents.push(document);
    }
    let report = run.finish().await.unwrap();
    documents.sort_by(|a, b| a.source_url.as_str().cmp(b.source_url.as_str()));
    (documents, report)
}

#[tokio::test]
async fn test_full_crawl_yields_details_with_seed_attributes() {
    let server = MockServer::start().await;
    mount_listing(&server).await;
    for id in [42, 43] {
        Mock::given(method("GET"))
            .and(path(format!("/item/{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_string(detail_page(id)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let cache = Arc::new(FsCache::open(dir.path()).unwrap());
    let run = crawler(cache.clone())
        .crawl(
            [url(&server, "/list?page=1")],
            strategy(),
            fast_policy(),
            Arc::new(DefaultFetchOptions::standard()),
        )
        .unwrap();
    let (documents, report) = drain(run).await;

    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].source_url, url(&server, "/item/42"));
    assert_eq!(documents[0].seed_attributes.get("img").map(String::as_str), Some("x.jpg"));
    assert!(documents[0].rendered_html.contains("Product 42"));
    assert_eq!(documents[1].source_url, url(&server, "/item/43"));
    assert!(documents[1].seed_attributes.is_empty());

    // page=2 links back to page=1; each listing is fetched once
    assert_eq!(report.listing_pages, 2);
    assert_eq!(report.documents_yielded, 2);
    assert_eq!(report.network_fetches, 4);
    assert_eq!(report.total_failures(), 0);
    assert!(!report.cancelled);
    assert!(!report.is_degraded());

    // everything landed in the cache
    assert!(cache.read(&url(&server, "/item/42")).is_some());
    assert!(cache.read(&url(&server, "/list?page=2")).is_some());
}

#[tokio::test]
async fn test_rerun_is_served_from_cache() {
    let server = MockServer::start().await;
    mount_listing(&server).await;
    for id in [42, 43] {
        Mock::given(method("GET"))
            .and(path(format!("/item/{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_string(detail_page(id)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let seeds = [url(&server, "/list?page=1")];

    let first = crawler(Arc::new(FsCache::open(dir.path()).unwrap()))
        .crawl(
            seeds.clone(),
            strategy(),
            fast_policy(),
            Arc::new(DefaultFetchOptions::standard()),
        )
        .unwrap();
    let (_, first_report) = drain(first).await;
    assert_eq!(first_report.network_fetches, 4);

    // A fresh cache handle over the same directory: the server mocks expect
    // exactly one request each, so any network fetch here fails the test.
    let second = crawler(Arc::new(FsCache::open(dir.path()).unwrap()))
        .crawl(
            seeds,
            strategy(),
            fast_policy(),
            Arc::new(DefaultFetchOptions::standard()),
        )
        .unwrap();
    let (documents, report) = drain(second).await;

    assert_eq!(documents.len(), 2);
    assert_eq!(report.cache_hits, 4);
    assert_eq!(report.network_fetches, 0);
}

#[tokio::test]
async fn test_challenge_then_normal_page_is_retried_and_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<li class="item"><a class="detail" href="/item/42">Widget</a></li>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item/42"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CHALLENGE))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item/42"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page(42)))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let cache = Arc::new(FsCache::open(dir.path()).unwrap());
    let run = crawler(cache.clone())
        .crawl(
            [url(&server, "/list")],
            strategy(),
            fast_policy(),
            Arc::new(DefaultFetchOptions::standard()),
        )
        .unwrap();
    let (documents, report) = drain(run).await;

    assert_eq!(documents.len(), 1);
    assert!(documents[0].rendered_html.contains("Product 42"));
    assert_eq!(report.challenges, 0);
    assert!(report.degraded_hosts.is_empty());

    let entry = cache.read(&url(&server, "/item/42")).unwrap();
    assert!(entry.raw_document.contains("Product 42"));
}

#[tokio::test]
async fn test_persistent_challenge_keeps_prior_entry_and_skips_host() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<li class="item"><a class="detail" href="/item/42">A</a></li>
               <li class="item"><a class="detail" href="/item/43">B</a></li>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item/42"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CHALLENGE))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item/43"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page(43)))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let cache = Arc::new(FsCache::open(dir.path()).unwrap());
    let item_42 = url(&server, "/item/42");
    cache
        .write(&item_42, &detail_page(42), 200, &Validators::default())
        .unwrap();

    let policy = PolitenessPolicy {
        max_global_concurrent: 1,
        ..fast_policy()
    };
    let options = DefaultFetchOptions::new(
        FetchOptions::listing(),
        FetchOptions::detail().with_ttl(Duration::ZERO),
    );
    let run = crawler(cache.clone())
        .with_degrade_mode(DegradeMode::Skip)
        .crawl([url(&server, "/list")], strategy(), policy, Arc::new(options))
        .unwrap();
    let (documents, report) = drain(run).await;

    assert!(documents.is_empty());
    assert_eq!(report.challenges, 1);
    assert_eq!(report.failures.get(&FetchErrorKind::Challenged), Some(&1));
    assert_eq!(report.skipped, 1);
    assert!(report.degraded_hosts.contains(item_42.host()));
    assert!(!report.listing_degraded);

    // the challenge never replaced the good copy
    let entry = cache.read(&item_42).unwrap();
    assert!(entry.raw_document.contains("Product 42"));
}

#[tokio::test]
async fn test_degraded_host_served_from_cache_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<li class="item"><a class="detail" href="/item/42">A</a></li>
               <li class="item"><a class="detail" href="/item/43">B</a></li>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item/42"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CHALLENGE))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item/43"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page(43)))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let cache = Arc::new(FsCache::open(dir.path()).unwrap());
    cache
        .write(&url(&server, "/item/43"), "<p>old 43</p>", 200, &Validators::default())
        .unwrap();

    let policy = PolitenessPolicy {
        max_global_concurrent: 1,
        ..fast_policy()
    };
    let options = DefaultFetchOptions::new(
        FetchOptions::listing(),
        FetchOptions::detail().with_ttl(Duration::ZERO),
    );
    let run = crawler(cache)
        .with_degrade_mode(DegradeMode::CacheOnly)
        .crawl([url(&server, "/list")], strategy(), policy, Arc::new(options))
        .unwrap();
    let (documents, report) = drain(run).await;

    // the stale copy of 43 is served instead of going back to the host
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].rendered_html, "<p>old 43</p>");
    assert_eq!(report.cache_hits, 1);
    assert_eq!(report.skipped, 0);
}

#[tokio::test]
async fn test_failed_detail_is_counted_not_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<li class="item"><a class="detail" href="/item/1">gone</a></li>
               <li class="item"><a class="detail" href="/item/2">ok</a></li>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item/1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item/2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page(2)))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let run = crawler(Arc::new(FsCache::open(dir.path()).unwrap()))
        .crawl(
            [url(&server, "/list")],
            strategy(),
            fast_policy(),
            Arc::new(DefaultFetchOptions::standard()),
        )
        .unwrap();
    let (documents, report) = drain(run).await;

    assert_eq!(documents.len(), 1);
    assert_eq!(report.failures.get(&FetchErrorKind::HttpStatus), Some(&1));
    assert!(report.degraded_hosts.is_empty());
}

#[tokio::test]
async fn test_no_seeds_is_an_error() {
    let dir = TempDir::new().unwrap();
    let result = crawler(Arc::new(FsCache::open(dir.path()).unwrap())).crawl(
        Vec::new(),
        strategy(),
        fast_policy(),
        Arc::new(DefaultFetchOptions::standard()),
    );
    assert!(matches!(result, Err(HarvestError::NoSeeds)));
}

#[tokio::test]
async fn test_invalid_policy_is_an_error() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    let policy = PolitenessPolicy {
        max_global_concurrent: 0,
        ..fast_policy()
    };
    let result = crawler(Arc::new(FsCache::open(dir.path()).unwrap())).crawl(
        [url(&server, "/list")],
        strategy(),
        policy,
        Arc::new(DefaultFetchOptions::standard()),
    );
    assert!(matches!(result, Err(HarvestError::Config(_))));
}

#[tokio::test]
async fn test_cancel_stops_pending_fetches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<li class="item"><a class="detail" href="/item/1">slow</a></li>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(detail_page(1))
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let run = crawler(Arc::new(FsCache::open(dir.path()).unwrap()))
        .with_cancellation(token.clone())
        .crawl(
            [url(&server, "/list")],
            strategy(),
            fast_policy(),
            Arc::new(DefaultFetchOptions::standard()),
        )
        .unwrap();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
    });

    let (documents, report) = tokio::time::timeout(Duration::from_secs(10), drain(run))
        .await
        .expect("cancelled run should finish promptly");

    assert!(documents.is_empty());
    assert!(report.cancelled);
    // cancellation is not a failure
    assert_eq!(report.total_failures(), 0);
}

#[tokio::test]
async fn test_documents_written_as_json_lines() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAGE_ONE))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item/42"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page(42)))
        .mount(&server)
        .await;
    // /list?page=2 matches the same mock; item/42 is only harvested once
    let dir = TempDir::new().unwrap();
    let run = crawler(Arc::new(FsCache::open(dir.path()).unwrap()))
        .crawl(
            [url(&server, "/list")],
            strategy(),
            fast_policy(),
            Arc::new(DefaultFetchOptions::standard()),
        )
        .unwrap();
    let (documents, report) = drain(run).await;
    assert_eq!(report.listing_pages, 2);
    assert_eq!(report.documents_yielded, 1);

    let mut sink = JsonLinesSink::new(Vec::new());
    for document in &documents {
        sink.write_document(document).unwrap();
    }
    sink.finish().unwrap();
    assert_eq!(sink.written(), 1);

    let output = String::from_utf8(sink.into_inner()).unwrap();
    let line: serde_json::Value = serde_json::from_str(output.trim_end()).unwrap();
    assert_eq!(line["url"], url(&server, "/item/42").as_str());
    assert_eq!(line["seed_attributes"]["img"], "x.jpg");
}

#[tokio::test]
async fn test_required_container_only_checked_on_detail_pages() {
    let server = MockServer::start().await;
    mount_listing(&server).await;
    Mock::given(method("GET"))
        .and(path("/item/42"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page(42)))
        .expect(1)
        .mount(&server)
        .await;
    // a placeholder shell without the product container
    Mock::given(method("GET"))
        .and(path("/item/43"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body><p>Loading</p></body></html>"),
        )
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("harvest.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
[politeness]
max-global-concurrent = 1
min-delay-ms = 0
base-backoff-ms = 1
max-jitter-ms = 0
max-retries = 1

[cache]
root = "{cache}"

[browser]
enabled = false

[[site]]
name = "shop"
seeds = ["{seed}"]
listing-selector = "a.next"
detail-selector = "a.detail"
item-selector = "li.item"
required-container = ".product"

[site.attributes]
img = "img@src"
"#,
            cache = dir.path().join("cache").display(),
            seed = url(&server, "/list?page=1"),
        ),
    )
    .unwrap();

    let config = load_config(&config_path).unwrap();
    let site = config.site("shop").unwrap();
    let cache = Arc::new(FsCache::open(&config.cache.root).unwrap());
    let http = HttpFetcher::new(config.crawler.user_agent(), config.crawler.request_timeout()).unwrap();
    let crawler = Crawler::new(cache, Arc::new(site.challenge_detector().unwrap()))
        .with_http(http)
        .with_degrade_mode(config.crawler.degrade_mode);

    let seeds = site.seeds.iter().map(|seed| normalize_url(seed).unwrap());
    let run = crawler
        .crawl(
            seeds,
            Arc::new(site.link_strategy().unwrap()),
            config.politeness.to_policy(),
            Arc::new(config.fetch_options(site)),
        )
        .unwrap();
    let (documents, report) = drain(run).await;

    // listings lack the product container but are still expanded
    assert_eq!(report.listing_pages, 2);
    assert!(!report.listing_degraded);

    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].source_url, url(&server, "/item/42"));
    assert_eq!(documents[0].seed_attributes.get("img").map(String::as_str), Some("x.jpg"));
    assert_eq!(report.challenges, 1);
    assert!(report.degraded_hosts.contains("127.0.0.1"));
}

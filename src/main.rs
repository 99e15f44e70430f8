//! Catalog-Harvest main entry point
//!
//! This is the command-line interface for the Catalog-Harvest crawl engine.

use catalog_harvest::browser::{BrowserSessionPool, ChromeSessionFactory};
use catalog_harvest::config::{load_config_with_hash, Config, SiteConfig};
use catalog_harvest::fetch::HttpFetcher;
use catalog_harvest::output::{format_markdown_report, print_report, DocumentSink, JsonLinesSink};
use catalog_harvest::session::SessionStore;
use catalog_harvest::{normalize_url, CrawlReport, Crawler, FsCache};
use clap::Parser;
use futures::StreamExt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Catalog-Harvest: a polite, cached, resumable crawl engine
///
/// Walks listing pages from configured seeds, fetches every product-detail
/// page they link to through a per-host politeness gate, and writes the
/// rendered documents as JSON lines. Re-running resumes from the cache.
#[derive(Parser, Debug)]
#[command(name = "catalog-harvest")]
#[command(version)]
#[command(about = "A polite, cached, resumable crawl engine", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Only crawl the named site
    #[arg(long, value_name = "NAME")]
    site: Option<String>,

    /// Serve everything from the cache and never touch the network
    #[arg(long)]
    cache_only: bool,

    /// Write documents to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Write a markdown run summary to FILE
    #[arg(long, value_name = "FILE")]
    summary: Option<PathBuf>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["cache_stats", "purge_stale"])]
    dry_run: bool,

    /// Show cache statistics and exit
    #[arg(long, conflicts_with_all = ["dry_run", "purge_stale"])]
    cache_stats: bool,

    /// Delete cache entries older than the detail TTL and exit
    #[arg(long, conflicts_with_all = ["dry_run", "cache_stats"])]
    purge_stale: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let sites = select_sites(&config, cli.site.as_deref())?;

    if cli.dry_run {
        handle_dry_run(&config, &sites);
    } else if cli.cache_stats {
        handle_cache_stats(&config)?;
    } else if cli.purge_stale {
        handle_purge_stale(&config)?;
    } else {
        handle_crawl(&cli, &config, &sites, &config_hash).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs go to stderr so documents can be piped from stdout.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_harvest=info,warn"),
            1 => EnvFilter::new("catalog_harvest=debug,info"),
            2 => EnvFilter::new("catalog_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn select_sites<'a>(
    config: &'a Config,
    name: Option<&str>,
) -> Result<Vec<&'a SiteConfig>, Box<dyn std::error::Error>> {
    match name {
        Some(name) => match config.site(name) {
            Some(site) => Ok(vec![site]),
            None => Err(format!("no site named '{}' in configuration", name).into()),
        },
        None => Ok(config.sites.iter().collect()),
    }
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, sites: &[&SiteConfig]) {
    println!("=== Catalog-Harvest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Degrade mode: {:?}", config.crawler.degrade_mode);
    println!("  Listing TTL: {}h", config.crawler.listing_ttl_hours);
    println!("  Detail TTL: {}d", config.crawler.detail_ttl_days);
    println!("  Lightweight first: {}", config.crawler.lightweight_first);
    println!("  User agent: {}", config.crawler.user_agent());

    let politeness = &config.politeness;
    println!("\nPoliteness:");
    println!("  Max global concurrent: {}", politeness.max_global_concurrent);
    println!("  Max per-host concurrent: {}", politeness.max_per_host_concurrent);
    println!("  Min delay per host: {}ms", politeness.min_delay_ms);
    println!(
        "  Retries: {} (base backoff {}ms, jitter {}ms)",
        politeness.max_retries, politeness.base_backoff_ms, politeness.max_jitter_ms
    );
    let retry_on: Vec<&str> = politeness.retry_on.iter().map(|k| k.as_str()).collect();
    println!("  Retry on: {}", retry_on.join(", "));
    for entry in &politeness.overrides {
        println!("  Override {}", entry.host);
    }

    println!("\nStorage:");
    println!("  Cache: {}", config.cache.root.display());
    println!("  Sessions: {}", config.sessions.root.display());

    println!("\nBrowser:");
    if config.browser.enabled {
        println!("  Pool size: {}", config.browser.pool_size);
        match &config.browser.remote_endpoint {
            Some(endpoint) => println!("  Remote endpoint: {}", endpoint),
            None => println!("  Headless: {}", config.browser.headless),
        }
    } else {
        println!("  Disabled (lightweight fetches only)");
    }

    println!("\nSites ({}):", sites.len());
    for site in sites {
        println!("  - {} ({} seeds)", site.name, site.seeds.len());
        for seed in &site.seeds {
            println!("    * {}", seed);
        }
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start crawling with {} seed URLs",
        sites.iter().map(|s| s.seeds.len()).sum::<usize>()
    );
}

/// Handles the --cache-stats mode
fn handle_cache_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let cache = FsCache::open(&config.cache.root)?;
    let inventory = cache.inventory(config.crawler.detail_ttl())?;

    println!("Cache: {}\n", cache.root().display());
    println!("Entries:     {}", inventory.entries);
    println!("Total size:  {} bytes", inventory.total_bytes);
    println!("Fresh:       {}", inventory.fresh);
    println!("Stale:       {}", inventory.stale);
    println!("Unreadable:  {}", inventory.unreadable);

    Ok(())
}

/// Handles the --purge-stale mode
fn handle_purge_stale(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let cache = FsCache::open(&config.cache.root)?;
    let removed = cache.purge_stale(config.crawler.detail_ttl())?;
    println!("✓ Removed {} stale entries from {}", removed, cache.root().display());
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    cli: &Cli,
    config: &Config,
    sites: &[&SiteConfig],
    config_hash: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let cache = Arc::new(FsCache::open(&config.cache.root)?);

    let pool = if config.browser.enabled && !cli.cache_only {
        let options = config.browser.chrome_options(config.crawler.user_agent.as_deref());
        let pool = BrowserSessionPool::new(
            Arc::new(ChromeSessionFactory::new(options)),
            config.browser.pool_size,
        )
        .with_session_store(Arc::new(SessionStore::new(&config.sessions.root)))
        .with_navigation_timeout(config.browser.navigation_timeout());
        pool.warm_up().await?;
        Some(Arc::new(pool))
    } else {
        None
    };

    let http = if cli.cache_only {
        None
    } else {
        Some(HttpFetcher::new(
            config.crawler.user_agent(),
            config.crawler.request_timeout(),
        )?)
    };

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted; finishing in-flight fetches");
                shutdown.cancel();
            }
        });
    }

    let writer: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(std::io::stdout())),
    };
    let mut sink = JsonLinesSink::new(writer);
    let mut summaries = String::new();

    for site in sites {
        if shutdown.is_cancelled() {
            break;
        }
        tracing::info!(site = %site.name, seeds = site.seeds.len(), "Crawling site");

        let detector = Arc::new(site.challenge_detector()?);
        let mut crawler = Crawler::new(Arc::clone(&cache), detector)
            .with_degrade_mode(config.crawler.degrade_mode)
            .with_document_buffer(config.crawler.document_buffer)
            .with_cancellation(shutdown.clone());
        if let Some(pool) = &pool {
            crawler = crawler.with_browser(Arc::clone(pool));
        }
        if let Some(http) = &http {
            crawler = crawler.with_http(http.clone());
        }

        let mut options = config.fetch_options(site);
        if cli.cache_only {
            options.listing = options.listing.cache_only();
            options.detail = options.detail.cache_only();
        }

        let seeds = site
            .seeds
            .iter()
            .map(|seed| normalize_url(seed))
            .collect::<Result<Vec<_>, _>>()?;

        let mut run = crawler.crawl(
            seeds,
            Arc::new(site.link_strategy()?),
            config.politeness.to_policy(),
            Arc::new(options),
        )?;

        while let Some(document) = run.next().await {
            if let Err(e) = sink.write_document(&document) {
                tracing::error!("Failed to write document: {}", e);
                run.cancel();
                break;
            }
        }

        let report: CrawlReport = run.finish().await?;
        eprintln!("\n=== {} ===", site.name);
        print_report(&report);
        summaries.push_str(&format!("<!-- site: {} -->\n", site.name));
        summaries.push_str(&format_markdown_report(&report, config_hash));
        summaries.push('\n');
    }

    sink.finish()?;
    tracing::info!(documents = sink.written(), "Crawl finished");

    if let Some(pool) = &pool {
        pool.shutdown().await;
    }

    if let Some(path) = &cli.summary {
        std::fs::write(path, summaries)?;
        eprintln!("✓ Summary written to: {}", path.display());
    }

    Ok(())
}

//! Crawl report display

use crate::crawler::CrawlReport;
use crate::FetchErrorKind;

/// Prints a run report to stderr in a formatted manner
///
/// Stdout is left to the document stream.
///
/// # Arguments
///
/// * `report` - The report to display
pub fn print_report(report: &CrawlReport) {
    eprintln!("=== Crawl Report ===\n");

    eprintln!("Overview:");
    eprintln!("  Listing pages expanded: {}", report.listing_pages);
    eprintln!("  Documents yielded: {}", report.documents_yielded);
    eprintln!("  Cache hits: {}", report.cache_hits);
    eprintln!("  Network fetches: {}", report.network_fetches);
    eprintln!("  Skipped (degraded hosts): {}", report.skipped);
    eprintln!("  Elapsed: {:.1}s", report.elapsed.as_secs_f64());
    eprintln!();

    if !report.failures.is_empty() {
        eprintln!("Failures by Kind:");
        for (kind, count) in sorted_failures(report) {
            eprintln!("  {}: {}", kind, count);
        }
        eprintln!();
    }

    if !report.degraded_hosts.is_empty() {
        eprintln!("Degraded Hosts ({}):", report.degraded_hosts.len());
        for host in &report.degraded_hosts {
            eprintln!("  - {}", host);
        }
        eprintln!();
    }

    if report.listing_degraded {
        eprintln!("Warning: a listing page was challenged; coverage may be incomplete");
    }
    if report.cancelled {
        eprintln!("Run was cancelled before the frontier was exhausted");
    }

    eprintln!(
        "Cache Hit Rate: {:.1}% ({} / {} fetched candidates)",
        cache_hit_rate(report),
        report.cache_hits,
        report.cache_hits + report.network_fetches
    );
}

/// Failure kinds sorted by count, most frequent first
pub(crate) fn sorted_failures(report: &CrawlReport) -> Vec<(FetchErrorKind, u64)> {
    let mut failures: Vec<_> = report.failures.iter().map(|(k, v)| (*k, *v)).collect();
    failures.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    failures
}

pub(crate) fn cache_hit_rate(report: &CrawlReport) -> f64 {
    let fetched = report.cache_hits + report.network_fetches;
    if fetched > 0 {
        (report.cache_hits as f64 / fetched as f64) * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_failures() {
        let mut report = CrawlReport::default();
        report.record_failure(FetchErrorKind::Challenged);
        report.record_failure(FetchErrorKind::Timeout);
        report.record_failure(FetchErrorKind::Timeout);

        let sorted = sorted_failures(&report);
        assert_eq!(sorted[0], (FetchErrorKind::Timeout, 2));
        assert_eq!(sorted[1], (FetchErrorKind::Challenged, 1));
    }

    #[test]
    fn test_cache_hit_rate() {
        let report = CrawlReport {
            cache_hits: 3,
            network_fetches: 1,
            ..Default::default()
        };
        assert!((cache_hit_rate(&report) - 75.0).abs() < f64::EPSILON);
        assert_eq!(cache_hit_rate(&CrawlReport::default()), 0.0);
    }
}

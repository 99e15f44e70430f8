//! Markdown run summary

use crate::crawler::CrawlReport;
use crate::output::stats::{cache_hit_rate, sorted_failures};
use crate::output::traits::OutputResult;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes a markdown summary of a crawl run
///
/// # Arguments
///
/// * `report` - The finished run's report
/// * `config_hash` - Hash of the configuration the run used
/// * `output_path` - Path where the markdown file should be written
pub fn write_markdown_report(
    report: &CrawlReport,
    config_hash: &str,
    output_path: &Path,
) -> OutputResult<()> {
    let markdown = format_markdown_report(report, config_hash);
    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;
    Ok(())
}

/// Formats a run report as markdown
pub fn format_markdown_report(report: &CrawlReport, config_hash: &str) -> String {
    let mut md = String::new();

    md.push_str("# Catalog-Harvest Run Summary\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!(
        "- **Finished**: {}\n",
        chrono::Utc::now().to_rfc3339()
    ));
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds\n",
        report.elapsed.as_secs_f64()
    ));
    let status = if report.cancelled {
        "cancelled"
    } else if report.is_degraded() {
        "degraded"
    } else {
        "complete"
    };
    md.push_str(&format!("- **Status**: {}\n", status));
    md.push_str(&format!("- **Config Hash**: {}\n\n", config_hash));

    md.push_str("## Statistics\n\n");
    md.push_str(&format!("- **Listing Pages**: {}\n", report.listing_pages));
    md.push_str(&format!(
        "- **Documents Yielded**: {}\n",
        report.documents_yielded
    ));
    md.push_str(&format!("- **Cache Hits**: {}\n", report.cache_hits));
    md.push_str(&format!(
        "- **Network Fetches**: {}\n",
        report.network_fetches
    ));
    md.push_str(&format!("- **Skipped**: {}\n", report.skipped));
    md.push_str(&format!(
        "- **Cache Hit Rate**: {:.2}%\n\n",
        cache_hit_rate(report)
    ));

    if !report.failures.is_empty() {
        md.push_str("## Failures\n\n");
        md.push_str("| Kind | Count |\n");
        md.push_str("|------|-------|\n");
        for (kind, count) in sorted_failures(report) {
            md.push_str(&format!("| {} | {} |\n", kind, count));
        }
        md.push('\n');
    }

    if !report.degraded_hosts.is_empty() {
        md.push_str("## Degraded Hosts\n\n");
        for host in &report.degraded_hosts {
            md.push_str(&format!("- {}\n", host));
        }
        md.push('\n');
    }

    md
}

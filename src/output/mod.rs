//! Output module for crawl results
//!
//! This module handles:
//! - Writing yielded documents as JSON lines
//! - Printing the end-of-run report
//! - Writing a markdown run summary

mod jsonl;
mod markdown;
pub mod stats;
mod traits;

pub use jsonl::JsonLinesSink;
pub use markdown::{format_markdown_report, write_markdown_report};
pub use stats::print_report;
pub use traits::{DocumentRecord, DocumentSink, OutputError, OutputResult};

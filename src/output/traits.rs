//! Output sink traits and types

use crate::crawler::FetchedDocument;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to format output: {0}")]
    Format(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Serialized form of a yielded document
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord<'a> {
    pub url: &'a str,
    pub seed_attributes: &'a BTreeMap<String, String>,
    pub html: &'a str,
}

impl<'a> From<&'a FetchedDocument> for DocumentRecord<'a> {
    fn from(document: &'a FetchedDocument) -> Self {
        Self {
            url: document.source_url.as_str(),
            seed_attributes: &document.seed_attributes,
            html: &document.rendered_html,
        }
    }
}

/// Destination for documents a crawl yields
pub trait DocumentSink {
    fn write_document(&mut self, document: &FetchedDocument) -> OutputResult<()>;

    /// Flushes buffered output; called once the run ends
    fn finish(&mut self) -> OutputResult<()>;
}

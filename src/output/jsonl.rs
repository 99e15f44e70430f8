use crate::crawler::FetchedDocument;
use crate::output::traits::{DocumentRecord, DocumentSink, OutputResult};
use std::io::Write;

/// Writes one JSON object per line
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Documents written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> DocumentSink for JsonLinesSink<W> {
    fn write_document(&mut self, document: &FetchedDocument) -> OutputResult<()> {
        serde_json::to_writer(&mut self.writer, &DocumentRecord::from(document))?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

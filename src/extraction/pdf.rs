use lopdf::Document;
use tracing::{debug, warn};

use crate::extraction::{chunk_attributes, chunk_text, Extraction, TextProducer};
use crate::types::{AppError, AppResult};

/// Embedded-text PDFs, extracted page by page with lopdf.
/// Scanned pages without a text layer yield no fragments.
pub struct PdfTextProducer {
    chunk_size: usize,
}

impl PdfTextProducer {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }
}

impl TextProducer for PdfTextProducer {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn extract(&self, bytes: &[u8], mime_hint: &str) -> AppResult<Extraction> {
        let doc = Document::load_mem(bytes)
            .map_err(|e| AppError::Extraction(format!("Failed to load PDF: {}", e)))?;

        let mut pages = Vec::new();
        for (page_number, _) in doc.get_pages() {
            match doc.extract_text(&[page_number]) {
                Ok(text) => pages.push((page_number as usize, text)),
                Err(e) => warn!(page = page_number, error = %e, "Skipping unreadable PDF page"),
            }
        }

        let mut chunks = Vec::new();
        for (page, text) in &pages {
            for chunk in chunk_text(text, self.chunk_size) {
                let attributes = chunk_attributes(mime_hint, chunks.len(), Some(*page));
                chunks.push((chunk, attributes));
            }
        }

        let text = pages
            .iter()
            .map(|(_, text)| text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        debug!(pages = pages.len(), chunks = chunks.len(), "Extracted PDF text");
        Ok(Extraction { text, chunks })
    }
}

use crate::extraction::{chunk_attributes, chunk_text, Extraction, TextProducer};
use crate::types::{AppError, AppResult};

/// UTF-8 text documents
pub struct PlainTextProducer {
    chunk_size: usize,
}

impl PlainTextProducer {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }
}

impl TextProducer for PlainTextProducer {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn extract(&self, bytes: &[u8], mime_hint: &str) -> AppResult<Extraction> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| AppError::Extraction(format!("Document is not valid UTF-8: {}", e)))?
            .trim_start_matches('\u{feff}')
            .to_string();

        let chunks = chunk_text(&text, self.chunk_size)
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| (chunk, chunk_attributes(mime_hint, i, None)))
            .collect();

        Ok(Extraction { text, chunks })
    }
}

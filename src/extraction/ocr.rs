use leptess::LepTess;
use tracing::debug;

use crate::extraction::{chunk_attributes, chunk_text, Extraction, TextProducer};
use crate::types::{AppError, AppResult};

/// Scanned documents and photos through Tesseract. Languages use Tesseract's
/// `eng+deu` form; traineddata is looked up in the default tessdata location.
pub struct OcrTextProducer {
    languages: String,
    chunk_size: usize,
}

impl OcrTextProducer {
    pub fn new(languages: &str, chunk_size: usize) -> Self {
        let languages = languages.trim();
        Self {
            languages: if languages.is_empty() { "eng" } else { languages }.to_string(),
            chunk_size,
        }
    }
}

impl TextProducer for OcrTextProducer {
    fn name(&self) -> &'static str {
        "ocr"
    }

    fn extract(&self, bytes: &[u8], mime_hint: &str) -> AppResult<Extraction> {
        let mut engine = LepTess::new(None, &self.languages)
            .map_err(|e| AppError::Extraction(format!("Failed to initialize Tesseract: {}", e)))?;
        engine
            .set_image_from_mem(bytes)
            .map_err(|e| AppError::Extraction(format!("Failed to load image for OCR: {}", e)))?;
        let text = engine
            .get_utf8_text()
            .map_err(|e| AppError::Extraction(format!("OCR failed: {}", e)))?
            .trim()
            .to_string();
        debug!(languages = %self.languages, chars = text.len(), "OCR finished");

        let chunks = chunk_text(&text, self.chunk_size)
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| (chunk, chunk_attributes(mime_hint, i, None)))
            .collect();

        Ok(Extraction { text, chunks })
    }
}

// Text extraction backends

use std::sync::Arc;

use serde_json::json;

use crate::config::ExtractionConfig;
use crate::retrieval::FragmentAttributes;
use crate::types::{AppError, AppResult};

pub mod chunker;
#[cfg(feature = "ocr")]
pub mod ocr;
pub mod pdf;
pub mod plain;

pub use chunker::chunk_text;
#[cfg(feature = "ocr")]
pub use ocr::OcrTextProducer;
pub use pdf::PdfTextProducer;
pub use plain::PlainTextProducer;

pub const DEFAULT_OCR_LANGUAGES: &str = "eng";

/// Extracted document text plus the fragments to index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub text: String,
    pub chunks: Vec<(String, FragmentAttributes)>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Turns raw document bytes into text. Implementations are CPU-bound and are
/// expected to run on the blocking pool.
pub trait TextProducer: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, bytes: &[u8], mime_hint: &str) -> AppResult<Extraction>;
}

/// Dispatches on the mime hint: PDFs to the PDF producer, `text/*` to the plain producer,
/// `image/*` to OCR when built with the `ocr` feature
pub struct RoutedProducer {
    plain: PlainTextProducer,
    pdf: PdfTextProducer,
    #[cfg(feature = "ocr")]
    ocr: OcrTextProducer,
}

impl RoutedProducer {
    pub fn new(chunk_size: usize) -> Self {
        Self::with_ocr_languages(chunk_size, DEFAULT_OCR_LANGUAGES)
    }

    pub fn with_ocr_languages(chunk_size: usize, languages: &str) -> Self {
        #[cfg(not(feature = "ocr"))]
        let _ = languages;
        Self {
            plain: PlainTextProducer::new(chunk_size),
            pdf: PdfTextProducer::new(chunk_size),
            #[cfg(feature = "ocr")]
            ocr: OcrTextProducer::new(languages, chunk_size),
        }
    }

    #[cfg(feature = "ocr")]
    fn extract_image(&self, bytes: &[u8], mime: &str) -> AppResult<Extraction> {
        self.ocr.extract(bytes, mime)
    }

    #[cfg(not(feature = "ocr"))]
    fn extract_image(&self, _bytes: &[u8], mime: &str) -> AppResult<Extraction> {
        Err(AppError::Extraction(format!(
            "OCR support is not enabled, cannot extract text from {}",
            mime
        )))
    }
}

impl TextProducer for RoutedProducer {
    fn name(&self) -> &'static str {
        "routed"
    }

    fn extract(&self, bytes: &[u8], mime_hint: &str) -> AppResult<Extraction> {
        let mime = mime_hint
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        if mime == "application/pdf" {
            self.pdf.extract(bytes, &mime)
        } else if mime.starts_with("text/") || mime == "application/json" {
            self.plain.extract(bytes, &mime)
        } else if mime.starts_with("image/") {
            self.extract_image(bytes, &mime)
        } else {
            Err(AppError::Extraction(format!(
                "Unsupported file type for extraction: {}",
                mime_hint
            )))
        }
    }
}

/// Build the producer selected by `EXTRACTION_BACKEND`
pub fn from_config(config: &ExtractionConfig) -> AppResult<Arc<dyn TextProducer>> {
    match config.backend.to_lowercase().as_str() {
        "plain" => Ok(Arc::new(PlainTextProducer::new(config.chunk_size))),
        "pdf" => Ok(Arc::new(PdfTextProducer::new(config.chunk_size))),
        "routed" => Ok(Arc::new(RoutedProducer::with_ocr_languages(
            config.chunk_size,
            &config.ocr_languages,
        ))),
        #[cfg(feature = "ocr")]
        "ocr" => Ok(Arc::new(OcrTextProducer::new(&config.ocr_languages, config.chunk_size))),
        other => Err(AppError::InvalidRequest(format!(
            "Unsupported extraction backend: {}",
            other
        ))),
    }
}

pub(crate) fn chunk_attributes(mime: &str, chunk: usize, page: Option<usize>) -> FragmentAttributes {
    let mut attributes = FragmentAttributes::new();
    attributes.insert("mime_type".to_string(), json!(mime));
    attributes.insert("chunk".to_string(), json!(chunk));
    if let Some(page) = page {
        attributes.insert("page".to_string(), json!(page));
    }
    attributes
}

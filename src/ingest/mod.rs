// Upload ingestion: blob transfer, text extraction, indexing

pub mod service;

pub use service::{IngestService, Upload};

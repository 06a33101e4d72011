// Summary document rendering

use crate::types::AppResult;

pub mod layout;
pub mod pdf;

pub use pdf::PdfRenderer;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub text: String,
    pub owner_display_name: Option<String>,
    pub category: String,
}

/// Turns summary text into a binary document. CPU-bound; run on the blocking pool.
pub trait Renderer: Send + Sync {
    fn content_type(&self) -> &'static str;

    fn render(&self, request: &RenderRequest) -> AppResult<Vec<u8>>;
}

use std::io::BufWriter;

use printpdf::{BuiltinFont, Mm, PdfDocument};
use tracing::debug;

use crate::render::layout::{self, PAGE_HEIGHT_MM, PAGE_WIDTH_MM};
use crate::render::{RenderRequest, Renderer};
use crate::types::{AppError, AppResult};

/// Letter-size PDF using the builtin Helvetica faces
#[derive(Debug, Clone, Default)]
pub struct PdfRenderer;

impl PdfRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Renderer for PdfRenderer {
    fn content_type(&self) -> &'static str {
        "application/pdf"
    }

    fn render(&self, request: &RenderRequest) -> AppResult<Vec<u8>> {
        let pages = layout::layout(request);
        let title = layout::document_title(&request.category);

        let (doc, first_page, first_layer) =
            PdfDocument::new(&title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| AppError::Render(format!("PDF font error: {e}")))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| AppError::Render(format!("PDF font error: {e}")))?;

        for (i, page) in pages.iter().enumerate() {
            let (page_index, layer_index) = if i == 0 {
                (first_page, first_layer)
            } else {
                doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), format!("Layer {}", i + 1))
            };
            let layer = doc.get_page(page_index).get_layer(layer_index);

            for line in page {
                let face = if line.style.is_bold() { &bold } else { &font };
                layer.use_text(&line.text, line.style.font_size(), Mm(line.x), Mm(line.y), face);
            }
        }

        let mut buf = BufWriter::new(Vec::new());
        doc.save(&mut buf)
            .map_err(|e| AppError::Render(format!("PDF save error: {e}")))?;
        let bytes = buf
            .into_inner()
            .map_err(|e| AppError::Render(format!("PDF buffer error: {e}")))?;

        debug!(pages = pages.len(), size = bytes.len(), "Rendered summary PDF");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_produces_pdf() {
        let request = RenderRequest {
            text: "## Medications\n- Metformin 500mg\n\nNo known allergies.".to_string(),
            owner_display_name: Some("Jane Doe".to_string()),
            category: "general".to_string(),
        };
        let bytes = PdfRenderer::new().render(&request).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_render_multi_page() {
        let text = (0..300)
            .map(|i| format!("Observation {} recorded during follow-up visit", i))
            .collect::<Vec<_>>()
            .join("\n");
        let request = RenderRequest {
            text,
            owner_display_name: None,
            category: "neurologist".to_string(),
        };
        let bytes = PdfRenderer::new().render(&request).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(bytes.len() > 1000);
    }
}

//! OCR path for scanned PDFs.
//!
//! Pages are rasterized with pdfium and read with Tesseract using the
//! configured language. Only compiled with the `ocr` feature; without it
//! the path reports [`IngestError::OcrUnavailable`].

use crate::config::OcrConfig;
use crate::error::IngestError;
use crate::extract::{ExtractedContent, Extraction};
use crate::models::ExtractionMethod;

/// Joins per-page OCR output, skipping blank pages. Page numbers are 1-based.
pub fn join_ocr_pages<'a>(pages: impl IntoIterator<Item = &'a str>) -> String {
    pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| format!("--- Page {} ---\n{}", i + 1, text.trim_end()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn unavailable(locator: &str, reason: String) -> Extraction {
    let error = IngestError::OcrUnavailable {
        locator: locator.to_string(),
        reason,
    };
    tracing::warn!(error = %error, "OCR skipped");
    Extraction {
        content: ExtractedContent::Text(String::new()),
        method: ExtractionMethod::Absent,
        error: Some(error),
    }
}

#[cfg(feature = "ocr")]
pub fn ocr_pdf(bytes: &[u8], locator: &str, config: &OcrConfig) -> Extraction {
    let pages = match engine::rasterize_pages(bytes, config) {
        Ok(pages) => pages,
        Err(reason) => return unavailable(locator, reason),
    };

    let mut texts = Vec::with_capacity(pages.len());
    for (index, png) in pages.iter().enumerate() {
        match engine::recognize(png, &config.language) {
            Ok(text) => texts.push(text),
            Err(reason) => {
                tracing::warn!(locator, page = index + 1, %reason, "OCR failed on page");
                texts.push(String::new());
            }
        }
    }

    let text = join_ocr_pages(texts.iter().map(String::as_str));
    tracing::info!(locator, pages = pages.len(), chars = text.len(), "OCR complete");
    let method = if text.is_empty() {
        ExtractionMethod::Absent
    } else {
        ExtractionMethod::Ocr
    };
    Extraction {
        content: ExtractedContent::Text(text),
        method,
        error: None,
    }
}

#[cfg(not(feature = "ocr"))]
pub fn ocr_pdf(_bytes: &[u8], locator: &str, _config: &OcrConfig) -> Extraction {
    unavailable(locator, "built without the `ocr` feature".to_string())
}

#[cfg(feature = "ocr")]
mod engine {
    use std::io::Write;

    use image::ImageFormat;
    use pdfium_render::prelude::*;

    use crate::config::OcrConfig;

    pub(super) fn rasterize_pages(data: &[u8], config: &OcrConfig) -> Result<Vec<Vec<u8>>, String> {
        let pdfium = Pdfium::new(
            Pdfium::bind_to_system_library().map_err(|e| format!("pdfium bind failed: {e}"))?,
        );
        let doc = pdfium
            .load_pdf_from_byte_slice(data, None)
            .map_err(|e| format!("pdfium open failed: {e}"))?;

        let page_count = doc.pages().len() as usize;
        let pages_to_render = page_count.min(config.max_pages);
        let mut png_buffers = Vec::with_capacity(pages_to_render);

        for index in 0..pages_to_render {
            let page = doc
                .pages()
                .get(index as u16)
                .map_err(|e| format!("page {index} access failed: {e}"))?;

            let width = (page.width().value * config.dpi / 72.0) as i32;
            let height = (page.height().value * config.dpi / 72.0) as i32;
            let bitmap = page
                .render_with_config(
                    &PdfRenderConfig::new()
                        .set_target_width(width)
                        .set_target_height(height),
                )
                .map_err(|e| format!("render page {index} failed: {e}"))?;

            let mut png_bytes: Vec<u8> = Vec::new();
            bitmap
                .as_image()
                .write_to(&mut std::io::Cursor::new(&mut png_bytes), ImageFormat::Png)
                .map_err(|e| format!("PNG encode page {index} failed: {e}"))?;
            png_buffers.push(png_bytes);
        }

        Ok(png_buffers)
    }

    /// Runs Tesseract over one PNG page.
    pub(super) fn recognize(png: &[u8], language: &str) -> Result<String, String> {
        let mut file = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .map_err(|e| e.to_string())?;
        file.write_all(png).map_err(|e| e.to_string())?;
        file.flush().map_err(|e| e.to_string())?;

        let image = rusty_tesseract::Image::from_path(file.path()).map_err(|e| e.to_string())?;
        let args = rusty_tesseract::Args {
            lang: language.to_string(),
            ..rusty_tesseract::Args::default()
        };
        rusty_tesseract::image_to_string(&image, &args).map_err(|e| e.to_string())
    }
}

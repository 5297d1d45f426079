//! Per-media-type text extraction.
//!
//! Every extractor resolves to an [`Extraction`]: the content (possibly
//! empty), the [`ExtractionMethod`] that produced it, and the error
//! classification when something went wrong. Nothing here returns `Err`;
//! a failing item degrades to empty output and the pipeline moves on.

use serde_json::Value;

use crate::config::OcrConfig;
use crate::error::IngestError;
use crate::models::{ExtractionMethod, MediaKind, Payload, SourceItem};

/// Separator placed between the text of consecutive PDF pages.
pub const PAGE_SEPARATOR: &str = "\n";

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Extracted payload: plain text, or a parsed structure for JSON input.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedContent {
    Text(String),
    Structure(Value),
}

impl ExtractedContent {
    pub fn is_empty(&self) -> bool {
        match self {
            ExtractedContent::Text(t) => t.trim().is_empty(),
            ExtractedContent::Structure(Value::Object(map)) => map.is_empty(),
            ExtractedContent::Structure(Value::Array(items)) => items.is_empty(),
            ExtractedContent::Structure(Value::Null) => true,
            ExtractedContent::Structure(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ExtractedContent::Text(t) => Some(t),
            ExtractedContent::Structure(_) => None,
        }
    }
}

/// Result of running one extractor over one item.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub content: ExtractedContent,
    pub method: ExtractionMethod,
    pub error: Option<IngestError>,
}

impl Extraction {
    fn text(text: String, method: ExtractionMethod) -> Self {
        let method = if text.trim().is_empty() {
            ExtractionMethod::Absent
        } else {
            method
        };
        Self {
            content: ExtractedContent::Text(text),
            method,
            error: None,
        }
    }

    fn failed_text(error: IngestError) -> Self {
        tracing::warn!(error = %error, "extraction degraded to empty text");
        Self {
            content: ExtractedContent::Text(String::new()),
            method: ExtractionMethod::Absent,
            error: Some(error),
        }
    }

    fn failed_structure(error: IngestError) -> Self {
        tracing::warn!(error = %error, "extraction degraded to empty structure");
        Self {
            content: ExtractedContent::Structure(Value::Object(Default::default())),
            method: ExtractionMethod::Absent,
            error: Some(error),
        }
    }
}

/// Caller choices for the extraction call.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Run OCR on PDFs whose digital text layer is empty.
    pub ocr: bool,
    pub ocr_config: OcrConfig,
}

/// Dispatches `item` to the extractor for its media kind.
///
/// PDF work runs on a blocking thread; a panic inside the PDF library is
/// caught at the join and classified as a malformed document.
pub async fn extract(item: SourceItem, options: &ExtractOptions) -> Extraction {
    let SourceItem {
        locator,
        media_kind,
        payload,
    } = item;

    let bytes = match payload {
        Payload::Bytes(bytes) => bytes,
        Payload::Path(path) => match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = IngestError::io(&path, &e);
                return match media_kind {
                    MediaKind::Json => Extraction::failed_structure(err),
                    _ => Extraction::failed_text(err),
                };
            }
        },
    };

    match media_kind {
        MediaKind::Text => decode_text(&bytes, &locator),
        MediaKind::Json => parse_json(&bytes, &locator),
        MediaKind::HtmlFragment => {
            let html = String::from_utf8_lossy(&bytes);
            Extraction::text(crate::html::visible_text(&html), ExtractionMethod::Primary)
        }
        MediaKind::Pdf => {
            let ocr = options.ocr;
            let ocr_config = options.ocr_config.clone();
            let task_locator = locator.clone();
            let joined = tokio::task::spawn_blocking(move || {
                let digital = extract_pdf(&bytes, &task_locator);
                if ocr && digital.error.is_none() && digital.content.is_empty() {
                    tracing::info!(locator = %task_locator, "no text layer, running OCR");
                    return crate::ocr::ocr_pdf(&bytes, &task_locator, &ocr_config);
                }
                digital
            })
            .await;
            joined.unwrap_or_else(|e| {
                Extraction::failed_text(IngestError::MalformedDocument {
                    locator,
                    reason: format!("PDF extraction aborted: {}", e),
                })
            })
        }
    }
}

/// Whether the document's trailer carries an `Encrypt` entry.
///
/// Bytes that do not load as a PDF are not encrypted; the text extractor
/// classifies them.
pub fn is_encrypted_pdf(bytes: &[u8]) -> bool {
    match lopdf::Document::load_mem(bytes) {
        Ok(doc) => doc.trailer.get(b"Encrypt").is_ok(),
        Err(e) => {
            tracing::debug!(error = %e, "PDF structure not readable");
            false
        }
    }
}

/// Extracts the text layer of a PDF page by page.
pub fn extract_pdf(bytes: &[u8], locator: &str) -> Extraction {
    if is_encrypted_pdf(bytes) {
        return Extraction::failed_text(IngestError::EncryptedDocument {
            locator: locator.to_string(),
        });
    }

    match pdf_extract::extract_text_from_mem_by_pages(bytes) {
        Ok(pages) => {
            let text = pages
                .iter()
                .map(|p| p.trim_end())
                .filter(|p| !p.trim().is_empty())
                .collect::<Vec<_>>()
                .join(PAGE_SEPARATOR);
            tracing::debug!(locator, pages = pages.len(), chars = text.len(), "PDF text extracted");
            Extraction::text(text.trim_end().to_string(), ExtractionMethod::Primary)
        }
        Err(e) => {
            let reason = e.to_string();
            if reason.to_ascii_lowercase().contains("encrypt") {
                Extraction::failed_text(IngestError::EncryptedDocument {
                    locator: locator.to_string(),
                })
            } else {
                Extraction::failed_text(IngestError::MalformedDocument {
                    locator: locator.to_string(),
                    reason,
                })
            }
        }
    }
}

/// Whether decoded text carries control characters no text file holds.
fn looks_binary(text: &str) -> bool {
    text.chars()
        .any(|c| c.is_ascii_control() && !matches!(c, '\t' | '\n' | '\r' | '\x0c'))
}

/// Decodes UTF-8 text, retrying as Latin-1 when the bytes are not valid UTF-8.
///
/// Either decoding is rejected as binary when the result holds control
/// characters other than tab, newline, carriage return and form feed.
pub fn decode_text(bytes: &[u8], locator: &str) -> Extraction {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let (text, method) = match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), ExtractionMethod::Primary),
        Err(_) => {
            tracing::debug!(locator, "not UTF-8, decoding as Latin-1");
            (bytes.iter().map(|&b| b as char).collect(), ExtractionMethod::Fallback)
        }
    };
    if looks_binary(&text) {
        return Extraction::failed_text(IngestError::UnsupportedEncoding {
            locator: locator.to_string(),
        });
    }
    Extraction::text(text.trim().to_string(), method)
}

/// Parses JSON; malformed input becomes an empty object.
pub fn parse_json(bytes: &[u8], locator: &str) -> Extraction {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => Extraction {
            content: ExtractedContent::Structure(value),
            method: ExtractionMethod::Primary,
            error: None,
        },
        Err(e) => Extraction::failed_structure(IngestError::MalformedDocument {
            locator: locator.to_string(),
            reason: e.to_string(),
        }),
    }
}

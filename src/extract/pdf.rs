use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;

use super::{ExtractError, Extraction, ExtractionDetails, Extractor};

/// PDF text via `pdf-extract`, page count via `lopdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn extract(&self, path: &Path) -> Result<Extraction, ExtractError> {
        let bytes = std::fs::read(path)?;

        // pdf-extract panics on some malformed font tables.
        let text = catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem(&bytes)
        }))
        .map_err(|_| parse_error("text extraction panicked"))?
        .map_err(|err| parse_error(err.to_string()))?;

        let page_count = match lopdf::Document::load_mem(&bytes) {
            Ok(document) => u32::try_from(document.get_pages().len()).ok(),
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "Could not count PDF pages");
                None
            }
        };

        Ok(Extraction {
            text: text.replace('\0', ""),
            details: ExtractionDetails {
                page_count,
                ..ExtractionDetails::default()
            },
        })
    }
}

fn parse_error(message: impl Into<String>) -> ExtractError {
    ExtractError::Parse {
        format: "pdf",
        message: message.into(),
    }
}

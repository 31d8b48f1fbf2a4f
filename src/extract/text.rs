use encoding_rs::{UTF_8, WINDOWS_1252};
use std::path::Path;

use super::{ExtractError, Extraction, ExtractionDetails, Extractor};

/// Plain text and markdown files.
///
/// UTF-8 (with or without a byte-order mark) and UTF-16 with a BOM are decoded directly;
/// anything that is not valid UTF-8 is read as Windows-1252, the usual encoding of legacy
/// exports.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl Extractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<Extraction, ExtractError> {
        let bytes = std::fs::read(path)?;
        Ok(Extraction {
            text: decode_text(&bytes),
            details: ExtractionDetails::default(),
        })
    }
}

pub(crate) fn decode_text(bytes: &[u8]) -> String {
    let (text, encoding, had_errors) = UTF_8.decode(bytes);
    if had_errors && encoding == UTF_8 {
        tracing::debug!("Input is not valid UTF-8; decoding as Windows-1252");
        let (fallback, _, _) = WINDOWS_1252.decode(bytes);
        return fallback.into_owned();
    }
    text.into_owned()
}

//! Format-specific text extraction.
//!
//! Each supported format has one [`Extractor`]; [`ExtractorRegistry`] dispatches on the closed
//! [`FileKind`] variant detected for a path. Extractors only pull text out of a file;
//! normalization happens later in the pipeline.

mod html;
mod pdf;
mod spreadsheet;
pub mod table;
mod text;
mod word;

pub use html::HtmlExtractor;
pub use pdf::PdfExtractor;
pub use spreadsheet::SpreadsheetExtractor;
pub use text::PlainTextExtractor;
pub use word::WordExtractor;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

/// Extensions picked up by [`discover_documents`].
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "pdf", "docx", "txt", "md", "markdown", "html", "htm", "xlsx", "xls", "csv",
];

/// Leading bytes inspected by [`FileKind::detect`].
pub const SNIFF_BYTES: usize = 512;

/// Errors raised by extractors.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// No extractor handles this file.
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    /// The extractor recognized the format but could not parse the file.
    #[error("failed to parse {format} document: {message}")]
    Parse {
        /// Format label of the failing extractor.
        format: &'static str,
        /// Diagnostic from the parsing library.
        message: String,
    },
    /// The file could not be read.
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
}

/// Closed set of document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Portable Document Format.
    Pdf,
    /// Office Open XML word processing document.
    Word,
    /// HTML page.
    Html,
    /// Delimited text or workbook.
    Spreadsheet,
    /// Plain text or markdown.
    PlainText,
    /// Anything else.
    Unsupported,
}

impl FileKind {
    /// Detect the kind from leading bytes, falling back to the extension.
    pub fn detect(path: &Path, header: &[u8]) -> Self {
        let by_extension = Self::from_path(path);

        if header.starts_with(b"%PDF") {
            return Self::Pdf;
        }
        if header.starts_with(b"PK\x03\x04") {
            // Zip container: the extension tells a docx from an xlsx.
            return match by_extension {
                Self::Word | Self::Spreadsheet => by_extension,
                _ => Self::Unsupported,
            };
        }
        if looks_like_html(header) && by_extension != Self::Spreadsheet {
            return Self::Html;
        }
        by_extension
    }

    /// Map a path's extension to a kind.
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        Self::from_extension(&extension)
    }

    /// Map a lowercase extension (without the dot) to a kind.
    pub fn from_extension(extension: &str) -> Self {
        match extension {
            "pdf" => Self::Pdf,
            "docx" => Self::Word,
            "html" | "htm" => Self::Html,
            "csv" | "xlsx" | "xls" => Self::Spreadsheet,
            "txt" | "md" | "markdown" => Self::PlainText,
            _ => Self::Unsupported,
        }
    }

    /// Short label recorded in metadata.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Word => "docx",
            Self::Html => "html",
            Self::Spreadsheet => "spreadsheet",
            Self::PlainText => "text",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn looks_like_html(header: &[u8]) -> bool {
    let head = String::from_utf8_lossy(header);
    let head = head.trim_start_matches('\u{feff}').trim_start().to_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// Optional facts an extractor may report alongside the text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionDetails {
    /// Number of pages, when the format has pages.
    pub page_count: Option<u32>,
    /// Whether tables were found and rendered.
    pub has_tables: Option<bool>,
    /// Number of sheets, for workbooks.
    pub sheet_count: Option<u32>,
}

/// Raw text pulled from a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Extracted text, not yet normalized.
    pub text: String,
    /// Format-specific details.
    pub details: ExtractionDetails,
}

/// Pulls text out of one document format.
pub trait Extractor: Send + Sync {
    /// Extract text from the file at `path`.
    fn extract(&self, path: &Path) -> Result<Extraction, ExtractError>;
}

/// One extractor per [`FileKind`].
#[derive(Clone)]
pub struct ExtractorRegistry {
    handlers: HashMap<FileKind, Arc<dyn Extractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(FileKind::Pdf, Arc::new(PdfExtractor));
        registry.register(FileKind::Word, Arc::new(WordExtractor));
        registry.register(FileKind::Html, Arc::new(HtmlExtractor));
        registry.register(FileKind::Spreadsheet, Arc::new(SpreadsheetExtractor));
        registry.register(FileKind::PlainText, Arc::new(PlainTextExtractor));
        registry
    }
}

impl ExtractorRegistry {
    /// Registry without any handlers.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Install or replace the handler for `kind`. Registering `Unsupported` has no effect.
    pub fn register(&mut self, kind: FileKind, extractor: Arc<dyn Extractor>) {
        if kind != FileKind::Unsupported {
            self.handlers.insert(kind, extractor);
        }
    }

    /// Run the handler for `kind`.
    pub fn extract(&self, kind: FileKind, path: &Path) -> Result<Extraction, ExtractError> {
        let Some(handler) = self.handlers.get(&kind) else {
            let extension = path
                .extension()
                .and_then(|ext| ext.to_str())
                .unwrap_or(kind.label());
            return Err(ExtractError::Unsupported(extension.to_string()));
        };
        handler.extract(path)
    }
}

/// Recursively collect supported documents under `root`, sorted by path.
pub fn discover_documents(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(error = %err, "Skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| FileKind::from_path(path) != FileKind::Unsupported)
        .collect();
    files.sort();
    files
}

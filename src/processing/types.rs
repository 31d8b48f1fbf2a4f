//! Core data types and error definitions for the processing pipeline.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use super::tokenizer::TokenizerError;
use crate::extract::ExtractError;

/// Integer identifier produced by the tokenizer adapter.
pub type TokenId = u32;

/// One token-bounded slice of a document, with its position in the parent token sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkRecord {
    /// Zero-based, contiguous sequence index.
    pub chunk_index: usize,
    /// Decoded chunk text.
    pub text: String,
    /// Number of tokens in this chunk.
    pub token_count: usize,
    /// Offset of the first token (inclusive).
    pub start_position: usize,
    /// Offset one past the last token (exclusive).
    pub end_position: usize,
}

/// Errors produced while turning a token sequence into chunk records.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// The window would never advance (`window_size - overlap < 1`).
    #[error("invalid chunk window: size {window_size} with overlap {overlap} never advances")]
    InvalidWindow {
        /// Requested window size in tokens.
        window_size: usize,
        /// Requested overlap in tokens.
        overlap: usize,
    },
    /// The tokenizer could not decode a window back into text.
    #[error("failed to decode chunk {chunk_index}: {source}")]
    Decode {
        /// Index of the chunk being decoded.
        chunk_index: usize,
        /// Underlying tokenizer failure.
        #[source]
        source: TokenizerError,
    },
}

/// Pipeline states a document moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Not started.
    Idle,
    /// Reading the file and pulling raw text out of it.
    Extracting,
    /// Cleaning the extracted text.
    Normalizing,
    /// Inferring domain and document type.
    Classifying,
    /// Tokenizing and splitting into chunks.
    Chunking,
    /// Writing artifacts through the persistence sink.
    Persisting,
    /// Finished successfully.
    Done,
    /// Terminal failure.
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Extracting => "extracting",
            Self::Normalizing => "normalizing",
            Self::Classifying => "classifying",
            Self::Chunking => "chunking",
            Self::Persisting => "persisting",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Per-document failures. These never escape a batch run.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// No extractor handles this file type.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    /// The extractor ran but produced no usable text.
    #[error("extraction failed: {0}")]
    ExtractionFailure(String),
    /// Tokenizing or splitting failed.
    #[error("failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Background task running the pipeline was cancelled or panicked.
    #[error("pipeline task aborted: {0}")]
    TaskAborted(String),
}

impl From<ExtractError> for ProcessingError {
    fn from(error: ExtractError) -> Self {
        match error {
            ExtractError::Unsupported(kind) => Self::UnsupportedFormat(kind),
            other => Self::ExtractionFailure(other.to_string()),
        }
    }
}

/// A failure paired with the stage that produced it.
#[derive(Debug)]
pub struct DocumentFailure {
    /// Stage active when the failure occurred.
    pub stage: PipelineStage,
    /// Failure cause.
    pub error: ProcessingError,
}

impl DocumentFailure {
    pub(crate) fn new(stage: PipelineStage, error: impl Into<ProcessingError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_extract_error_maps_to_unsupported_format() {
        let error: ProcessingError = ExtractError::Unsupported("exe".into()).into();
        assert!(matches!(error, ProcessingError::UnsupportedFormat(kind) if kind == "exe"));
    }

    #[test]
    fn parse_extract_error_maps_to_extraction_failure() {
        let error: ProcessingError = ExtractError::Parse {
            format: "pdf",
            message: "broken xref".into(),
        }
        .into();
        assert!(matches!(error, ProcessingError::ExtractionFailure(_)));
    }

    #[test]
    fn stage_display_is_snake_case() {
        assert_eq!(PipelineStage::Extracting.to_string(), "extracting");
        assert_eq!(PipelineStage::Failed.to_string(), "failed");
    }
}

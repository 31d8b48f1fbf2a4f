//! Metadata assembly for processed documents.

use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use super::{chunking::ChunkWindow, types::ChunkRecord};

/// Version stamped into every assembled record.
pub const PROCESSOR_VERSION: &str = env!("CARGO_PKG_VERSION");
/// Upper bound on the recommended number of search results.
pub const MAX_RECOMMENDED_SEARCH_K: usize = 5;

/// Facts gathered about one document during extraction and classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentMetadata {
    /// File name without directories.
    pub filename: String,
    /// Detected file type label (`pdf`, `word`, ...).
    pub file_type: String,
    /// Size of the source file in bytes.
    pub size_bytes: u64,
    /// SHA-256 of the source file bytes, hex encoded.
    pub content_hash: String,
    /// RFC3339 timestamp of extraction.
    pub extraction_date: String,
    /// Length of the normalized text in characters.
    pub text_length: usize,
    /// Token count of the normalized text.
    pub token_count: usize,
    /// Inferred domain category.
    pub domain: String,
    /// Inferred document type.
    pub doc_type: String,
    /// Page count reported by the extractor, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    /// Whether the extractor found tables, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_tables: Option<bool>,
    /// Number of sheets for spreadsheet sources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_count: Option<u32>,
    /// Whether the file exceeded the configured size advisory.
    pub size_advisory_exceeded: bool,
}

/// Chunking parameters that were actually applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkingStrategy {
    /// Always `token_based`.
    pub method: &'static str,
    /// Window size in tokens.
    pub chunk_size: usize,
    /// Overlap in tokens.
    pub overlap: usize,
}

/// Processing block of an assembled record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingInfo {
    /// RFC3339 timestamp of assembly.
    pub processed_date: String,
    /// Crate version that produced the record.
    pub processor_version: &'static str,
    /// Number of chunks produced.
    pub total_chunks: usize,
    /// Applied chunking configuration.
    pub chunking_strategy: ChunkingStrategy,
}

/// Downstream embedding expectations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding model identifier expected by the knowledge base.
    pub embedding_model: String,
    /// Vector dimensionality expected by the knowledge base.
    pub vector_dimensions: usize,
    /// `min(total_chunks, 5)`.
    pub recommended_search_k: usize,
}

/// Complete per-document metadata record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataRecord {
    /// Extraction and classification facts.
    pub document_info: DocumentMetadata,
    /// Processing details.
    pub processing_info: ProcessingInfo,
    /// Embedding expectations for downstream ingestion.
    pub embedding_config: EmbeddingConfig,
}

/// Embedding model expectations copied into every record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingProfile {
    /// Embedding model identifier.
    pub model: String,
    /// Vector dimensionality.
    pub dimensions: usize,
}

impl Default for EmbeddingProfile {
    fn default() -> Self {
        Self {
            model: "amazon.titan-embed-text-v2".into(),
            dimensions: 1024,
        }
    }
}

/// Merge document metadata, chunk statistics and the applied window into one record.
///
/// Pure: `processed_at` is supplied by the caller.
pub fn assemble(
    document: DocumentMetadata,
    chunks: &[ChunkRecord],
    window: ChunkWindow,
    embedding: &EmbeddingProfile,
    processed_at: OffsetDateTime,
) -> MetadataRecord {
    let total_chunks = chunks.len();
    MetadataRecord {
        document_info: document,
        processing_info: ProcessingInfo {
            processed_date: format_timestamp(processed_at),
            processor_version: PROCESSOR_VERSION,
            total_chunks,
            chunking_strategy: ChunkingStrategy {
                method: "token_based",
                chunk_size: window.size(),
                overlap: window.overlap(),
            },
        },
        embedding_config: EmbeddingConfig {
            embedding_model: embedding.model.clone(),
            vector_dimensions: embedding.dimensions,
            recommended_search_k: total_chunks.min(MAX_RECOMMENDED_SEARCH_K),
        },
    }
}

/// Render a timestamp as RFC3339, falling back to the unix timestamp if formatting fails.
pub(crate) fn format_timestamp(at: OffsetDateTime) -> String {
    at.format(&Rfc3339)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

//! Document pipeline: normalization, classification, token windows and metadata, driven by
//! [`ProcessingService`].

pub mod chunking;
pub mod classify;
pub mod metadata;
pub mod normalize;
pub mod service;
pub mod tokenizer;
pub mod types;

pub use service::{BatchSummary, DocumentOutcome, ProcessedDocument, ProcessingService, StopHandle};
pub use tokenizer::{TiktokenTokenizer, Tokenizer, TokenizerError};
pub use types::{
    ChunkRecord, ChunkingError, DocumentFailure, PipelineStage, ProcessingError, TokenId,
};

//! Tokenizer adapter used for both counting and slicing.
//!
//! The pipeline only needs two operations: `encode` text into token ids and `decode` a slice of
//! ids back into text. [`TiktokenTokenizer`] backs both with `tiktoken-rs`; tests plug in their
//! own implementations of [`Tokenizer`].

use anyhow::Error as EncodingError;
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

use super::types::TokenId;

/// Largest number of boundary tokens dropped when a window splits a multi-byte character.
const MAX_BOUNDARY_TRIM: usize = 3;

/// Errors raised by tokenizer adapters.
#[derive(Debug, Error)]
pub enum TokenizerError {
    /// Encoding tables for the requested model could not be loaded.
    #[error("failed to initialize tokenizer '{name}': {source}")]
    Load {
        /// Encoding or model name we attempted to load.
        name: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: EncodingError,
    },
    /// Token ids could not be turned back into text.
    #[error("failed to decode {len} tokens: {message}")]
    Decode {
        /// Number of tokens in the rejected slice.
        len: usize,
        /// Diagnostic from the tokenizer library.
        message: String,
    },
}

/// Opaque text <-> token id codec.
pub trait Tokenizer: Send + Sync {
    /// Convert text into token ids.
    fn encode(&self, text: &str) -> Vec<TokenId>;

    /// Convert a slice of token ids back into text.
    ///
    /// Implementations may drop a few tokens at either edge when the slice cuts a multi-byte
    /// character. The characters of those tokens are then missing from the returned text; they
    /// are not replaced with U+FFFD. Callers keep the full slice for `token_count` and positions,
    /// so chunk text can be slightly shorter than the window it describes.
    fn decode(&self, tokens: &[TokenId]) -> Result<String, TokenizerError>;
}

/// BPE tokenizer backed by `tiktoken-rs`.
#[derive(Clone)]
pub struct TiktokenTokenizer {
    name: String,
    encoding: Arc<CoreBPE>,
}

impl TiktokenTokenizer {
    /// Load the encoding for a model or encoding name (`cl100k_base` when blank).
    pub fn load(name: &str) -> Result<Self, TokenizerError> {
        let normalized = name.trim();
        let target = if normalized.is_empty() {
            "cl100k_base"
        } else {
            normalized
        };
        let encoding = resolve_encoding(target).map_err(|source| TokenizerError::Load {
            name: target.to_string(),
            source,
        })?;
        tracing::debug!(encoding = target, "Tokenizer loaded");
        Ok(Self {
            name: target.to_string(),
            encoding: Arc::new(encoding),
        })
    }

    /// Name the tokenizer was loaded with.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn decode_exact(&self, tokens: &[TokenId]) -> Result<String, TokenizerError> {
        self.encoding
            .decode(tokens.to_vec())
            .map_err(|err| TokenizerError::Decode {
                len: tokens.len(),
                message: err.to_string(),
            })
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn encode(&self, text: &str) -> Vec<TokenId> {
        self.encoding.encode_ordinary(text)
    }

    /// Decode a window of tokens.
    ///
    /// A window boundary may fall inside a multi-byte character, which is not valid UTF-8 on its
    /// own. In that case up to [`MAX_BOUNDARY_TRIM`] tokens are dropped from either edge until
    /// the slice decodes. The dropped tokens contribute no text, so the partial character and any
    /// whole characters sharing those tokens are lost from this chunk's text, although the
    /// neighbouring chunk holds them when the overlap covers the trimmed tokens. Positions and
    /// `token_count` stay those of the full slice.
    fn decode(&self, tokens: &[TokenId]) -> Result<String, TokenizerError> {
        let first_error = match self.decode_exact(tokens) {
            Ok(text) => return Ok(text),
            Err(error) => error,
        };

        for lead in 0..=MAX_BOUNDARY_TRIM {
            for trail in 0..=MAX_BOUNDARY_TRIM {
                if lead + trail == 0 || lead + trail >= tokens.len() {
                    continue;
                }
                let slice = &tokens[lead..tokens.len() - trail];
                if let Ok(text) = self.decode_exact(slice) {
                    tracing::trace!(lead, trail, "Trimmed split character at chunk boundary");
                    return Ok(text);
                }
            }
        }

        Err(first_error)
    }
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, EncodingError> {
    if let Some(candidate) = encoding_from_name(model) {
        return candidate;
    }
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::warn!(
                model,
                error = %model_err,
                "Unknown tokenizer model; falling back to 'cl100k_base'"
            );
            cl100k_base()
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, EncodingError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_text() {
        let tokenizer = TiktokenTokenizer::load("cl100k_base").unwrap();
        let text = "Amazon S3 stores objects in buckets.";
        let tokens = tokenizer.encode(text);
        assert!(!tokens.is_empty());
        assert_eq!(tokenizer.decode(&tokens).unwrap(), text);
    }

    #[test]
    fn split_characters_are_dropped_at_window_edges() {
        let tokenizer = TiktokenTokenizer::load("cl100k_base").unwrap();
        let text = "deploy 𓀀𓀁 rollback";
        let tokens = tokenizer.encode(text);

        let mut trimmed = 0;
        for start in 0..tokens.len() {
            for end in start + 1..=tokens.len() {
                let slice = &tokens[start..end];
                let Ok(decoded) = tokenizer.decode(slice) else {
                    continue;
                };
                assert!(!decoded.contains('\u{FFFD}'), "{decoded:?}");
                assert!(text.contains(&decoded), "{decoded:?} not in {text:?}");
                if tokenizer.decode_exact(slice).is_err() {
                    trimmed += 1;
                }
            }
        }
        assert!(trimmed > 0, "rare characters should span several tokens");
    }

    #[test]
    fn blank_name_defaults_to_cl100k() {
        let tokenizer = TiktokenTokenizer::load("  ").unwrap();
        assert_eq!(tokenizer.name(), "cl100k_base");
    }

    #[test]
    fn unknown_model_falls_back_instead_of_failing() {
        let tokenizer = TiktokenTokenizer::load("definitely-not-a-model").unwrap();
        assert!(!tokenizer.encode("hello").is_empty());
    }
}

//! Token-window chunking.
//!
//! The splitter walks a token sequence with a fixed window and a fixed overlap:
//!
//! - a window starts at offset 0 and covers up to `window_size` tokens;
//! - each window is decoded through the [`Tokenizer`] and recorded with its token offsets;
//! - the next window starts `window_size - overlap` tokens later;
//! - splitting continues while the next start offset is still inside the sequence.
//!
//! A sequence of `N` tokens yields `ceil(N / (window_size - overlap))` chunks. Windows near the
//! end are clipped to the sequence length, so the last chunk always ends at `N`. Identical
//! inputs always produce identical boundaries.

use super::{
    tokenizer::Tokenizer,
    types::{ChunkRecord, ChunkingError, TokenId},
};

/// Validated window parameters: `size > overlap`, so the splitter always advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkWindow {
    size: usize,
    overlap: usize,
}

impl ChunkWindow {
    /// Validate a window size and overlap pair.
    pub fn new(size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        if size == 0 || size <= overlap {
            return Err(ChunkingError::InvalidWindow {
                window_size: size,
                overlap,
            });
        }
        Ok(Self { size, overlap })
    }

    /// Maximum tokens per chunk.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Tokens shared by consecutive chunks.
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between consecutive chunk starts.
    pub fn stride(&self) -> usize {
        self.size - self.overlap
    }

    /// Number of chunks [`split_tokens`] produces for `total_tokens` tokens.
    pub fn chunk_count(&self, total_tokens: usize) -> usize {
        total_tokens.div_ceil(self.stride())
    }
}

/// Split `tokens` into overlapping windows and decode each one.
///
/// Rejects `window_size <= overlap` with [`ChunkingError::InvalidWindow`]; an empty sequence
/// yields no chunks.
pub fn split_tokens(
    tokens: &[TokenId],
    window_size: usize,
    overlap: usize,
    tokenizer: &dyn Tokenizer,
) -> Result<Vec<ChunkRecord>, ChunkingError> {
    let window = ChunkWindow::new(window_size, overlap)?;
    split_with_window(tokens, window, tokenizer)
}

/// Split using an already validated [`ChunkWindow`].
pub fn split_with_window(
    tokens: &[TokenId],
    window: ChunkWindow,
    tokenizer: &dyn Tokenizer,
) -> Result<Vec<ChunkRecord>, ChunkingError> {
    let total = tokens.len();
    let mut chunks = Vec::with_capacity(window.chunk_count(total));
    let mut start = 0;

    while start < total {
        let end = (start + window.size()).min(total);
        let slice = &tokens[start..end];
        let chunk_index = chunks.len();
        let text = tokenizer
            .decode(slice)
            .map_err(|source| ChunkingError::Decode {
                chunk_index,
                source,
            })?;

        chunks.push(ChunkRecord {
            chunk_index,
            text,
            token_count: slice.len(),
            start_position: start,
            end_position: end,
        });

        start += window.stride();
    }

    Ok(chunks)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::processing::tokenizer::{TiktokenTokenizer, TokenizerError};

    /// Deterministic tokenizer: one token per whitespace-separated word `w<N>`.
    pub(crate) struct WordTokenizer;

    impl Tokenizer for WordTokenizer {
        fn encode(&self, text: &str) -> Vec<TokenId> {
            text.split_whitespace()
                .filter_map(|word| word.trim_start_matches('w').parse().ok())
                .collect()
        }

        fn decode(&self, tokens: &[TokenId]) -> Result<String, TokenizerError> {
            Ok(tokens
                .iter()
                .map(|id| format!("w{id}"))
                .collect::<Vec<_>>()
                .join(" "))
        }
    }

    fn sequence(len: u32) -> Vec<TokenId> {
        (0..len).collect()
    }

    fn sequence_text(range: std::ops::Range<u32>) -> String {
        range.map(|id| format!("w{id}")).collect::<Vec<_>>().join(" ")
    }

    fn bounds(chunks: &[ChunkRecord]) -> Vec<(usize, usize)> {
        chunks
            .iter()
            .map(|chunk| (chunk.start_position, chunk.end_position))
            .collect()
    }

    #[test]
    fn splits_1700_tokens_into_three_windows() {
        let chunks = split_tokens(&sequence(1700), 800, 100, &WordTokenizer).unwrap();
        assert_eq!(bounds(&chunks), vec![(0, 800), (700, 1500), (1400, 1700)]);
        assert_eq!(
            chunks.iter().map(|c| c.token_count).collect::<Vec<_>>(),
            vec![800, 800, 300]
        );
        assert_eq!(
            chunks.iter().map(|c| c.chunk_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(chunks[1].text.starts_with("w700 "));
        assert!(chunks[2].text.ends_with(" w1699"));
    }

    #[test]
    fn empty_sequence_yields_no_chunks() {
        let chunks = split_tokens(&[], 800, 100, &WordTokenizer).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn splits_1500_tokens_with_clipped_tail() {
        let chunks = split_tokens(&sequence(1500), 800, 100, &WordTokenizer).unwrap();
        assert_eq!(bounds(&chunks), vec![(0, 800), (700, 1500), (1400, 1500)]);
        assert_eq!(chunks[2].token_count, 100);
        assert_eq!(chunks[2].text, sequence_text(1400..1500));
    }

    #[test]
    fn short_sequences_follow_stride_count() {
        let chunks = split_tokens(&sequence(1), 800, 100, &WordTokenizer).unwrap();
        assert_eq!(bounds(&chunks), vec![(0, 1)]);
        let chunks = split_tokens(&sequence(700), 800, 100, &WordTokenizer).unwrap();
        assert_eq!(bounds(&chunks), vec![(0, 700)]);
        let chunks = split_tokens(&sequence(750), 800, 100, &WordTokenizer).unwrap();
        assert_eq!(bounds(&chunks), vec![(0, 750), (700, 750)]);
        let chunks = split_tokens(&sequence(10), 4, 1, &WordTokenizer).unwrap();
        assert_eq!(bounds(&chunks), vec![(0, 4), (3, 7), (6, 10), (9, 10)]);
    }

    #[test]
    fn rejects_window_that_never_advances() {
        let error = split_tokens(&sequence(10), 100, 100, &WordTokenizer).unwrap_err();
        assert!(matches!(
            error,
            ChunkingError::InvalidWindow {
                window_size: 100,
                overlap: 100
            }
        ));
        assert!(split_tokens(&sequence(10), 50, 100, &WordTokenizer).is_err());
        assert!(split_tokens(&sequence(10), 0, 0, &WordTokenizer).is_err());
    }

    #[test]
    fn chunks_cover_sequence_without_gaps() {
        for (len, size, overlap) in [(1, 1, 0), (97, 10, 3), (1000, 64, 63), (513, 512, 100)] {
            let chunks = split_tokens(&sequence(len), size, overlap, &WordTokenizer).unwrap();
            let window = ChunkWindow::new(size, overlap).unwrap();
            assert_eq!(chunks.len(), window.chunk_count(len as usize));
            assert_eq!(chunks[0].start_position, 0);
            assert_eq!(chunks.last().unwrap().end_position, len as usize);
            for pair in chunks.windows(2) {
                assert!(pair[1].start_position <= pair[0].end_position);
                assert_eq!(pair[1].start_position, pair[0].start_position + (size - overlap));
                assert_eq!(
                    pair[0].end_position,
                    (pair[0].start_position + size).min(len as usize)
                );
            }
        }
    }

    #[test]
    fn splitting_is_reproducible() {
        let tokens = sequence(2500);
        let first = split_tokens(&tokens, 512, 100, &WordTokenizer).unwrap();
        let second = split_tokens(&tokens, 512, 100, &WordTokenizer).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn chunk_count_matches_formula() {
        let window = ChunkWindow::new(800, 100).unwrap();
        assert_eq!(window.chunk_count(0), 0);
        assert_eq!(window.chunk_count(1), 1);
        assert_eq!(window.chunk_count(700), 1);
        assert_eq!(window.chunk_count(800), 2);
        assert_eq!(window.chunk_count(1500), 3);
        assert_eq!(window.chunk_count(1700), 3);
        assert_eq!(window.stride(), 700);
    }

    #[test]
    fn smaller_windows_produce_more_chunks_with_tiktoken() {
        let tokenizer = TiktokenTokenizer::load("cl100k_base").unwrap();
        let text = "API documentation ".repeat(500);
        let tokens = tokenizer.encode(&text);
        let api = split_tokens(&tokens, 512, 100, &tokenizer).unwrap();
        let guide = split_tokens(&tokens, 1024, 100, &tokenizer).unwrap();
        assert!(api.len() > guide.len());
        for chunk in &api {
            assert!(chunk.token_count <= 512);
            assert!(!chunk.text.is_empty());
        }
    }
}

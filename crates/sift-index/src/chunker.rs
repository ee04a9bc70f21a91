//! Chunking strategies
//!
//! Two strategies produce bounded windows over content text:
//! - Sliding window: fixed stride of `chunk_size - overlap`
//! - Sentence-based: sentence accumulation up to `chunk_size`
//!
//! Both emit chunks with contiguous positions from 0 and only emit windows
//! of at least `min_chunk_size` characters.

use sift_core::{ChunkSpan, ContentChunk, Result, SiftError};

/// Configuration for a chunking pass
#[derive(Debug, Clone, Copy)]
pub struct ChunkConfig {
    /// Target window size in characters
    pub chunk_size: usize,

    /// Overlap between consecutive sliding windows
    pub overlap: usize,

    /// Windows shorter than this are not emitted
    pub min_chunk_size: usize,
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, overlap: usize, min_chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(SiftError::validation("chunk_size", "must be positive"));
        }
        if overlap >= chunk_size {
            return Err(SiftError::validation(
                "overlap",
                "must be smaller than chunk_size",
            ));
        }
        if min_chunk_size > chunk_size {
            return Err(SiftError::validation(
                "min_chunk_size",
                "must not exceed chunk_size",
            ));
        }
        Ok(Self {
            chunk_size,
            overlap,
            min_chunk_size,
        })
    }
}

/// Available chunking strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    SlidingWindow,
    SentenceBased,
}

impl ChunkStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SlidingWindow => "sliding_window",
            Self::SentenceBased => "sentence_based",
        }
    }

    /// All strategy names, for the surface listing
    pub fn available() -> Vec<&'static str> {
        vec!["sliding_window", "sentence_based"]
    }
}

impl std::str::FromStr for ChunkStrategy {
    type Err = SiftError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sliding_window" => Ok(Self::SlidingWindow),
            "sentence_based" => Ok(Self::SentenceBased),
            other => Err(SiftError::validation(
                "strategy",
                format!("unknown chunking strategy `{other}`"),
            )),
        }
    }
}

/// Chunk text with the given strategy
pub fn chunk_text(text: &str, strategy: ChunkStrategy, config: &ChunkConfig) -> Vec<ContentChunk> {
    match strategy {
        ChunkStrategy::SlidingWindow => sliding_window(text, config),
        ChunkStrategy::SentenceBased => sentence_based(text, config),
    }
}

/// Fixed-stride windows of `chunk_size` characters
///
/// The stride is `chunk_size - overlap`. The last window may be shorter than
/// `chunk_size`; it is emitted only when it still reaches `min_chunk_size`.
pub fn sliding_window(text: &str, config: &ChunkConfig) -> Vec<ContentChunk> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let step = config.chunk_size - config.overlap;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut position = 0u32;

    while start < len {
        let end = (start + config.chunk_size).min(len);
        if end - start >= config.min_chunk_size {
            chunks.push(ContentChunk {
                text: chars[start..end].iter().collect(),
                embedding: None,
                position,
                span: ChunkSpan {
                    start_index: start,
                    end_index: end,
                    chunk_size: config.chunk_size,
                    overlap: config.overlap,
                },
            });
            position += 1;
        }
        if end == len {
            break;
        }
        start += step;
    }

    chunks
}

/// Sentence-accumulating windows
///
/// Sentences are split on `.`, `!`, `?`. The buffer is emitted when adding
/// the next sentence would exceed `chunk_size` and the buffer has already
/// reached `min_chunk_size`; the final buffer is emitted when it reaches
/// `min_chunk_size`.
pub fn sentence_based(text: &str, config: &ChunkConfig) -> Vec<ContentChunk> {
    let chars: Vec<char> = text.chars().collect();
    let sentences = split_sentences(&chars);
    if sentences.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut position = 0u32;
    let mut buffer_start: Option<usize> = None;
    let mut buffer_end = 0usize;

    let emit = |start: usize, end: usize, position: &mut u32, chunks: &mut Vec<ContentChunk>| {
        if end - start >= config.min_chunk_size {
            chunks.push(ContentChunk {
                text: chars[start..end].iter().collect(),
                embedding: None,
                position: *position,
                span: ChunkSpan {
                    start_index: start,
                    end_index: end,
                    chunk_size: config.chunk_size,
                    overlap: 0,
                },
            });
            *position += 1;
        }
    };

    for (sent_start, sent_end) in sentences {
        match buffer_start {
            None => {
                buffer_start = Some(sent_start);
                buffer_end = sent_end;
            }
            Some(start) => {
                let grown = sent_end - start;
                if grown > config.chunk_size && buffer_end - start >= config.min_chunk_size {
                    emit(start, buffer_end, &mut position, &mut chunks);
                    buffer_start = Some(sent_start);
                    buffer_end = sent_end;
                } else {
                    buffer_end = sent_end;
                }
            }
        }
    }

    if let Some(start) = buffer_start {
        emit(start, buffer_end, &mut position, &mut chunks);
    }

    chunks
}

/// Sentence boundaries as (start, end) char offsets, terminator included
fn split_sentences(chars: &[char]) -> Vec<(usize, usize)> {
    let mut sentences = Vec::new();
    let mut start = 0usize;

    for (idx, c) in chars.iter().enumerate() {
        if matches!(c, '.' | '!' | '?') {
            let end = idx + 1;
            if trimmed_len(&chars[start..end]) > 0 {
                sentences.push((start, end));
            }
            start = end;
        }
    }

    if start < chars.len() && trimmed_len(&chars[start..]) > 0 {
        sentences.push((start, chars.len()));
    }

    sentences
}

fn trimmed_len(chars: &[char]) -> usize {
    chars.iter().filter(|c| !c.is_whitespace()).count()
}

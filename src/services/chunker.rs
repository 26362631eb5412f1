//! Text normalization and overlapping word-window chunking.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ChunkError;
use crate::models::{Chunk, ChunkingConfig};

/// A line holding nothing but a number, e.g. a page number left by extraction.
static NUMERAL_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*\d+[ \t]*\r?$").expect("valid regex"));

/// Strip numeral-only lines and collapse all whitespace runs to single spaces.
pub fn normalize_text(text: &str) -> String {
    let without_numerals = NUMERAL_LINE.replace_all(text, "");
    without_numerals.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits text into overlapping windows of whole words.
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
}

impl TextChunker {
    /// Create a chunker. `chunk_size` must be positive and larger than `overlap`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkError> {
        if chunk_size == 0 {
            return Err(ChunkError::InvalidArgument(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(ChunkError::InvalidArgument(format!(
                "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self, ChunkError> {
        Self::new(config.chunk_size, config.overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Number of words the window advances between chunks.
    pub fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }

    /// Chunk `text` into windows starting every `step` words.
    ///
    /// The final window may be shorter than `chunk_size`; it is kept as is.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let step = self.step();

        (0..words.len())
            .step_by(step)
            .map(|start| {
                let end = start.saturating_add(self.chunk_size).min(words.len());
                Chunk::new(words[start..end].join(" "), start)
            })
            .collect()
    }

    /// Normalize then chunk, the path taken by every uploaded document.
    pub fn chunk_document(&self, raw: &str) -> Vec<Chunk> {
        self.chunk(&normalize_text(raw))
    }
}

/// Chunk `text` with the given window size and overlap.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>, ChunkError> {
    Ok(TextChunker::new(chunk_size, overlap)?.chunk(text))
}

//! The unit of retrieval.

use serde::{Deserialize, Serialize};

use crate::utils::calculate_checksum;

/// A window of words taken from a normalized document.
///
/// Chunks are immutable once created: the chunker builds them, the embedder
/// reads them and the retrieval store keeps them verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    text: String,
    source_offset: usize,
}

impl Chunk {
    pub fn new(text: impl Into<String>, source_offset: usize) -> Self {
        Self {
            text: text.into(),
            source_offset,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Index of the chunk's first word in the normalized document.
    pub fn source_offset(&self) -> usize {
        self.source_offset
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// SHA-256 of the chunk text, usable as a content-addressed identity.
    pub fn content_hash(&self) -> String {
        calculate_checksum(&self.text)
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

impl AsRef<str> for Chunk {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_accessors() {
        let chunk = Chunk::new("cells divide by mitosis", 40);
        assert_eq!(chunk.text(), "cells divide by mitosis");
        assert_eq!(chunk.source_offset(), 40);
        assert_eq!(chunk.word_count(), 4);
    }

    #[test]
    fn test_content_hash_ignores_offset() {
        let a = Chunk::new("same words", 0);
        let b = Chunk::new("same words", 80);
        let c = Chunk::new("other words", 0);
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
        assert_eq!(a.content_hash().len(), 64);
    }
}

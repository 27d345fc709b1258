//! Fixed-size overlapping text chunking.
//!
//! Chunk boundaries must be deterministic for a given (text, size, overlap)
//! so that the persisted index stays valid across restarts. No boundary
//! snapping to sentences or whitespace.

use serde::{Deserialize, Serialize};

use super::Document;

/// A bounded text segment derived from a document for indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Parent document id.
    pub doc_id: String,
    /// Sequence index within the document.
    pub seq: usize,
    /// Character offset of the chunk start in the document text.
    pub start: usize,
    /// The chunk text.
    pub text: String,
}

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// `chunk_overlap` must be strictly smaller than `chunk_size`;
    /// `Settings::validate` enforces this before construction.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap,
        }
    }

    /// Split one document into ordered overlapping chunks.
    ///
    /// Each chunk's start advances by `chunk_size - chunk_overlap`; the
    /// final chunk is truncated to the remaining text.
    pub fn split(&self, doc: &Document) -> Vec<Chunk> {
        let chars: Vec<char> = doc.text.chars().collect();
        let total = chars.len();
        if total == 0 {
            return Vec::new();
        }

        let step = self.chunk_size.saturating_sub(self.chunk_overlap).max(1);
        let mut chunks = Vec::new();
        let mut start = 0;
        let mut seq = 0;

        while start < total {
            let end = (start + self.chunk_size).min(total);
            chunks.push(Chunk {
                doc_id: doc.id.clone(),
                seq,
                start,
                text: chars[start..end].iter().collect(),
            });
            if end == total {
                break;
            }
            start += step;
            seq += 1;
        }

        chunks
    }

    /// Chunk a whole corpus, preserving document order.
    pub fn split_all(&self, docs: &[Document]) -> Vec<Chunk> {
        docs.iter().flat_map(|doc| self.split(doc)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::DocumentFormat;

    fn doc(text: &str) -> Document {
        Document {
            id: "d1".to_string(),
            path: "d1.txt".into(),
            text: text.to_string(),
            format: DocumentFormat::Text,
        }
    }

    #[test]
    fn chunks_tile_with_exact_overlap() {
        let chunker = Chunker::new(10, 3);
        let text: String = ('a'..='z').collect();
        let chunks = chunker.split(&doc(&text));

        // Starts advance by size - overlap = 7.
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.start, i * 7);
            assert_eq!(chunk.seq, i);
        }
        // Every chunk except the last is full-size and overlaps its
        // successor by exactly 3 characters.
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].text.chars().count(), 10);
            let tail: String = pair[0].text.chars().skip(7).collect();
            let head: String = pair[1].text.chars().take(3).collect();
            assert_eq!(tail, head);
        }
        // Final chunk is truncated to the remaining text.
        let last = chunks.last().unwrap();
        assert_eq!(last.start + last.text.chars().count(), 26);
    }

    #[test]
    fn deterministic_for_fixed_inputs() {
        let chunker = Chunker::new(50, 10);
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(8);
        let a = chunker.split(&doc(&text));
        let b = chunker.split(&doc(&text));
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.start, y.start);
            assert_eq!(x.text, y.text);
        }
    }

    #[test]
    fn short_text_yields_single_chunk() {
        let chunker = Chunker::new(2000, 400);
        let chunks = chunker.split(&doc("short"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "short");
        assert_eq!(chunks[0].start, 0);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = Chunker::new(2000, 400);
        assert!(chunker.split(&doc("")).is_empty());
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let chunker = Chunker::new(4, 1);
        let chunks = chunker.split(&doc("đơn hàng của bạn"));
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 4);
        }
    }
}

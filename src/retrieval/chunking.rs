//! Fixed-size character chunking with overlap.
//!
//! A page is walked in windows of `chunk_size` characters. Each window is trimmed and kept when
//! non-empty; the next window starts `overlap` characters before the end of the previous one.
//! The walk ends with the window that reaches the end of the text. Positions count Unicode
//! scalar values, never bytes, so slicing never splits a character.

use super::types::{Chunk, ChunkingError, PageText};

/// Default window in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// Default overlap in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Validated chunk window and overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingPolicy {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkingPolicy {
    /// Build a policy; requires `chunk_size > 0` and `overlap < chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkingError::InvalidOverlap {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Window in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Overlap in characters.
    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

impl Default for ChunkingPolicy {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Split `text` into overlapping chunks tagged with `page`.
pub fn chunk_text(text: &str, page: Option<u32>, policy: &ChunkingPolicy) -> Vec<Chunk> {
    // Byte offset of every character boundary, including the end of the text.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let length = boundaries.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < length {
        let end = (start + policy.chunk_size).min(length);
        let window = text[boundaries[start]..boundaries[end]].trim();
        if !window.is_empty() {
            chunks.push(Chunk {
                text: window.to_string(),
                page,
            });
        }
        if end == length {
            break;
        }
        // end > overlap here because end = start + chunk_size and overlap < chunk_size.
        start = end - policy.overlap;
    }
    chunks
}

/// Chunk every page independently and concatenate the results in page order.
pub fn chunk_pages(pages: &[PageText], policy: &ChunkingPolicy) -> Vec<Chunk> {
    pages
        .iter()
        .flat_map(|page| chunk_text(&page.text, Some(page.page), policy))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(chunk_size: usize, overlap: usize) -> ChunkingPolicy {
        ChunkingPolicy::new(chunk_size, overlap).expect("valid policy")
    }

    #[test]
    fn thousand_characters_yield_three_windows() {
        let text = "A".repeat(1000);
        let chunks = chunk_text(&text, Some(1), &ChunkingPolicy::default());
        let lengths: Vec<usize> = chunks.iter().map(|chunk| chunk.text.len()).collect();
        assert_eq!(lengths, vec![500, 500, 100]);
        assert!(chunks.iter().all(|chunk| chunk.page == Some(1)));
    }

    #[test]
    fn windows_overlap_by_configured_amount() {
        let text: String = ('a'..='z').collect();
        let chunks = chunk_text(&text, None, &policy(10, 3));
        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["abcdefghij", "hijklmnopq", "opqrstuvwx", "vwxyz"]);
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("  hello  ", Some(2), &policy(500, 50));
        assert_eq!(
            chunks,
            vec![Chunk {
                text: "hello".into(),
                page: Some(2)
            }]
        );
    }

    #[test]
    fn whitespace_windows_are_dropped_but_walk_continues() {
        let text = format!("{}{}", " ".repeat(20), "tail");
        let chunks = chunk_text(&text, None, &policy(10, 2));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "tail");
    }

    #[test]
    fn empty_text_produces_nothing() {
        assert!(chunk_text("", None, &ChunkingPolicy::default()).is_empty());
        assert!(chunk_text(" \n\t ", None, &ChunkingPolicy::default()).is_empty());
    }

    #[test]
    fn multibyte_characters_count_as_one() {
        let text = "é".repeat(12);
        let chunks = chunk_text(&text, None, &policy(5, 1));
        assert!(chunks.iter().all(|chunk| chunk.text.chars().count() <= 5));
        assert_eq!(chunks[0].text.chars().count(), 5);
    }

    #[test]
    fn chunks_never_exceed_window_and_cover_input() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        let policy = policy(64, 16);
        let chunks = chunk_text(&text, None, &policy);
        assert!(chunks.iter().all(|chunk| chunk.text.chars().count() <= 64));

        // Every character position falls inside some window of the walk.
        let length = text.chars().count();
        let step = policy.chunk_size() - policy.overlap();
        let windows = (length - policy.overlap()).div_ceil(step);
        assert_eq!(chunks.len(), windows);
        assert!(text.trim_end().ends_with(chunks.last().unwrap().text.as_str()));
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "lorem ipsum dolor sit amet ".repeat(50);
        let first = chunk_text(&text, Some(3), &policy(100, 10));
        let second = chunk_text(&text, Some(3), &policy(100, 10));
        assert_eq!(first, second);
    }

    #[test]
    fn pages_are_concatenated_in_order() {
        let pages = vec![
            PageText::new(1, "x".repeat(12)),
            PageText::new(2, "   "),
            PageText::new(3, "y".repeat(5)),
        ];
        let chunks = chunk_pages(&pages, &policy(10, 2));
        let pages: Vec<Option<u32>> = chunks.iter().map(|chunk| chunk.page).collect();
        assert_eq!(pages, vec![Some(1), Some(1), Some(3)]);
    }

    #[test]
    fn policy_rejects_non_advancing_overlap() {
        assert_eq!(
            ChunkingPolicy::new(10, 10),
            Err(ChunkingError::InvalidOverlap {
                chunk_size: 10,
                overlap: 10
            })
        );
        assert_eq!(
            ChunkingPolicy::new(0, 0),
            Err(ChunkingError::InvalidChunkSize)
        );
    }
}

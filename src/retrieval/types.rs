//! Core data types and error definitions for the retrieval pipeline.

use super::index::{IndexError, VectorIndex};
use crate::embedding::EmbeddingError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while configuring the chunker.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// Chunk windows must hold at least one character.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must be strictly smaller than the window so every step advances.
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    InvalidOverlap {
        /// Configured window in characters.
        chunk_size: usize,
        /// Configured overlap in characters.
        overlap: usize,
    },
}

/// Errors emitted by the retrieval pipeline.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Embedding model unavailable or inference failed.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingError),
    /// Index construction or search rejected the vectors.
    #[error("Failed to index document: {0}")]
    Index(#[from] IndexError),
    /// No usable text remained after chunking.
    #[error("No text available to index")]
    EmptyInput,
    /// A query arrived before any document was indexed.
    #[error("Upload a document first")]
    NotIndexed,
    /// The client exceeded its per-minute quota.
    #[error("Rate limit exceeded for client {client_id}")]
    RateLimited {
        /// Identifier of the rejected client.
        client_id: String,
    },
}

/// One page of cleaned text supplied by the upload collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// One-based page number.
    pub page: u32,
    /// Page contents.
    pub text: String,
}

impl PageText {
    /// Convenience constructor.
    pub fn new(page: u32, text: impl Into<String>) -> Self {
        Self {
            page,
            text: text.into(),
        }
    }
}

/// Contiguous segment of source text, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Trimmed segment text.
    pub text: String,
    /// Page the segment came from, when known.
    pub page: Option<u32>,
}

/// Chunks of the active document paired with the index built from their embeddings.
///
/// `index` row `i` is the embedding of `chunks[i]`. The pair is constructed together and
/// shared immutably, so readers always see chunks and vectors from the same upload.
pub struct DocumentState {
    chunks: Vec<Chunk>,
    index: Box<dyn VectorIndex>,
}

impl DocumentState {
    /// Pair `chunks` with `index`, rejecting mismatched lengths.
    pub fn new(chunks: Vec<Chunk>, index: Box<dyn VectorIndex>) -> Result<Self, IndexError> {
        if chunks.len() != index.len() {
            return Err(IndexError::CountMismatch {
                chunks: chunks.len(),
                vectors: index.len(),
            });
        }
        Ok(Self { chunks, index })
    }

    /// Ordered chunks of the document.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Index over the chunk embeddings.
    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }
}

/// Summary of a completed upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Number of chunks indexed for the document.
    pub chunk_count: usize,
    /// Number of non-empty pages that contributed chunks.
    pub page_count: usize,
}

/// Chunk returned by a query, nearest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    /// Position of the chunk within the document.
    pub chunk_index: usize,
    /// Chunk text.
    pub text: String,
    /// Source page, when known.
    pub page: Option<u32>,
    /// Squared L2 distance to the query embedding.
    pub distance: f32,
}

/// Result of a query against the active document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryOutcome {
    /// Retrieved chunks ordered by ascending distance.
    pub results: Vec<RetrievedChunk>,
}

impl QueryOutcome {
    /// Texts of the retrieved chunks in rank order.
    pub fn texts(&self) -> Vec<String> {
        self.results.iter().map(|hit| hit.text.clone()).collect()
    }
}

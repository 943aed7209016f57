//! Retrieval pipeline: chunking, embedding, vector indexing, and nearest-neighbor queries.

pub mod chunking;
pub mod index;
mod service;
pub mod types;

pub use chunking::{ChunkingPolicy, chunk_pages, chunk_text};
pub use index::{FlatL2Builder, FlatL2Index, IndexBuilder, IndexError, Neighbor, VectorIndex};
pub use service::{EmbeddingSchedule, RetrievalApi, RetrievalService};
pub use types::{
    Chunk, ChunkingError, DocumentState, PageText, QueryOutcome, RetrievalError, RetrievedChunk,
    UploadOutcome,
};

//! Nearest-neighbor search over chunk embeddings.
//!
//! [`VectorIndex`] is the search seam used by the retrieval service; [`FlatL2Index`] is the
//! exact implementation, a linear scan ranking rows by squared Euclidean distance. Indexes are
//! immutable once built; a new document gets a new index.

use std::cmp::Ordering;
use thiserror::Error;

/// Errors raised while building or querying an index.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    /// An indexed vector disagrees with the dimension of the first vector.
    #[error("vector {position} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        /// Position of the offending vector.
        position: usize,
        /// Dimension of the first vector.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// The query vector disagrees with the indexed dimension.
    #[error("query has dimension {actual}, index expects {expected}")]
    QueryDimensionMismatch {
        /// Dimension of indexed vectors.
        expected: usize,
        /// Dimension of the query.
        actual: usize,
    },
    /// Vectors must have at least one component.
    #[error("cannot index zero-length vectors")]
    EmptyVector,
    /// Chunk and vector counts diverged.
    #[error("{chunks} chunks paired with {vectors} vectors")]
    CountMismatch {
        /// Number of chunks.
        chunks: usize,
        /// Number of indexed vectors.
        vectors: usize,
    },
}

/// Search hit: indexed row and its distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Row of the indexed vector, matching the chunk position.
    pub index: usize,
    /// Squared L2 distance to the query.
    pub distance: f32,
}

/// Read-only nearest-neighbor index over a fixed set of vectors.
pub trait VectorIndex: Send + Sync {
    /// Number of indexed vectors.
    fn len(&self) -> usize;

    /// Whether the index holds no vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimension of the indexed vectors (0 when empty).
    fn dimension(&self) -> usize;

    /// Return up to `k` rows nearest to `query`, ascending by distance, ties by lower row.
    ///
    /// `k` larger than the index is clamped; an empty index yields no hits.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError>;
}

/// Builds an index from embeddings in chunk order.
pub trait IndexBuilder: Send + Sync {
    /// Construct an index whose row `i` is `vectors[i]`.
    fn build(&self, vectors: Vec<Vec<f32>>) -> Result<Box<dyn VectorIndex>, IndexError>;
}

/// Builder for [`FlatL2Index`].
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatL2Builder;

impl IndexBuilder for FlatL2Builder {
    fn build(&self, vectors: Vec<Vec<f32>>) -> Result<Box<dyn VectorIndex>, IndexError> {
        Ok(Box::new(FlatL2Index::build(vectors)?))
    }
}

/// Exact index storing vectors row-major in one contiguous buffer.
#[derive(Debug, Clone, Default)]
pub struct FlatL2Index {
    dimension: usize,
    rows: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    /// Build an index; all vectors must share one non-zero dimension.
    pub fn build(vectors: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        let Some(first) = vectors.first() else {
            return Ok(Self::default());
        };
        let dimension = first.len();
        if dimension == 0 {
            return Err(IndexError::EmptyVector);
        }

        let mut data = Vec::with_capacity(dimension * vectors.len());
        for (position, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    position,
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            data.extend_from_slice(vector);
        }

        Ok(Self {
            dimension,
            rows: vectors.len(),
            data,
        })
    }
}

impl VectorIndex for FlatL2Index {
    fn len(&self) -> usize {
        self.rows
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        let k = k.min(self.rows);
        if k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(IndexError::QueryDimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut hits: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(index, row)| Neighbor {
                index,
                distance: squared_l2(query, row),
            })
            .collect();

        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, rank);
            hits.truncate(k);
        }
        hits.sort_by(rank);
        Ok(hits)
    }
}

fn rank(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.index.cmp(&b.index))
}

/// Squared Euclidean distance between two equal-length vectors.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing upload and query activity.
#[derive(Default)]
pub struct RetrievalMetrics {
    documents_indexed: AtomicU64,
    chunks_indexed: AtomicU64,
    last_chunk_count: AtomicU64,
    queries_served: AtomicU64,
    queries_rate_limited: AtomicU64,
}

impl RetrievalMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an indexed document and the number of chunks produced for it.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_indexed.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
        self.last_chunk_count.store(chunk_count, Ordering::Relaxed);
    }

    /// Record a query that reached the index.
    pub fn record_query(&self) {
        self.queries_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a query turned away by the rate limiter.
    pub fn record_rejection(&self) {
        self.queries_rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let documents_indexed = self.documents_indexed.load(Ordering::Relaxed);
        MetricsSnapshot {
            documents_indexed,
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            last_chunk_count: (documents_indexed > 0)
                .then(|| self.last_chunk_count.load(Ordering::Relaxed)),
            queries_served: self.queries_served.load(Ordering::Relaxed),
            queries_rate_limited: self.queries_rate_limited.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents indexed since startup.
    pub documents_indexed: u64,
    /// Total chunk count produced across all indexed documents.
    pub chunks_indexed: u64,
    /// Chunk count of the most recently indexed document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_chunk_count: Option<u64>,
    /// Queries answered from the index.
    pub queries_served: u64,
    /// Queries rejected by the rate limiter.
    pub queries_rate_limited: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_documents_and_chunks() {
        let metrics = RetrievalMetrics::new();
        metrics.record_document(2);
        metrics.record_document(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_indexed, 2);
        assert_eq!(snapshot.chunks_indexed, 5);
        assert_eq!(snapshot.last_chunk_count, Some(3));
    }

    #[test]
    fn counts_queries_and_rejections_separately() {
        let metrics = RetrievalMetrics::new();
        metrics.record_query();
        metrics.record_query();
        metrics.record_rejection();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.queries_served, 2);
        assert_eq!(snapshot.queries_rate_limited, 1);
        assert_eq!(snapshot.last_chunk_count, None);
    }
}

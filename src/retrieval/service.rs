//! Retrieval service coordinating chunking, embedding, indexing, and admission control.

use crate::{
    config::Config,
    embedding::Embedder,
    metrics::{MetricsSnapshot, RetrievalMetrics},
    rate_limit::RateLimiter,
    retrieval::{
        chunking::{ChunkingPolicy, chunk_pages},
        index::{FlatL2Builder, IndexBuilder},
        types::{
            ChunkingError, DocumentState, PageText, QueryOutcome, RetrievalError, RetrievedChunk,
            UploadOutcome,
        },
    },
};
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt, stream};
use std::sync::{Arc, PoisonError, RwLock};

/// Batching applied when embedding the chunks of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingSchedule {
    /// Chunks per embedding request.
    pub batch_size: usize,
    /// Requests kept in flight at once.
    pub concurrency: usize,
}

impl Default for EmbeddingSchedule {
    fn default() -> Self {
        Self {
            batch_size: 16,
            concurrency: 4,
        }
    }
}

/// Owns the active document and runs uploads and queries against it.
///
/// The active [`DocumentState`] sits behind an `RwLock<Option<Arc<_>>>`. Uploads build a
/// complete state off to the side and swap the pointer in one write; queries clone the pointer
/// under a read lock and work on that snapshot, so a query never sees chunks from one upload
/// paired with the index of another. Construct the service once and share it through an `Arc`.
pub struct RetrievalService {
    embedder: Arc<Embedder>,
    index_builder: Box<dyn IndexBuilder>,
    rate_limiter: RateLimiter,
    policy: ChunkingPolicy,
    schedule: EmbeddingSchedule,
    state: RwLock<Option<Arc<DocumentState>>>,
    metrics: Arc<RetrievalMetrics>,
}

/// Abstraction over the retrieval pipeline used by the HTTP surface.
#[async_trait]
pub trait RetrievalApi: Send + Sync {
    /// Chunk, embed, and index `pages`, replacing the active document.
    async fn upload(&self, pages: Vec<PageText>) -> Result<UploadOutcome, RetrievalError>;

    /// Retrieve the `top_k` chunks nearest to `question` on behalf of `client_id`.
    async fn query(
        &self,
        question: &str,
        top_k: usize,
        client_id: &str,
    ) -> Result<QueryOutcome, RetrievalError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl RetrievalService {
    /// Assemble a service from explicit components.
    pub fn new(
        embedder: Arc<Embedder>,
        rate_limiter: RateLimiter,
        policy: ChunkingPolicy,
        schedule: EmbeddingSchedule,
    ) -> Self {
        Self {
            embedder,
            index_builder: Box::new(FlatL2Builder),
            rate_limiter,
            policy,
            schedule: EmbeddingSchedule {
                batch_size: schedule.batch_size.max(1),
                concurrency: schedule.concurrency.max(1),
            },
            state: RwLock::new(None),
            metrics: Arc::new(RetrievalMetrics::new()),
        }
    }

    /// Build a service from runtime configuration.
    pub fn from_config(config: &Config) -> Result<Self, ChunkingError> {
        let policy = ChunkingPolicy::new(config.chunk_size, config.chunk_overlap)?;
        tracing::info!(
            provider = ?config.embedding_provider,
            model = %config.embedding_model,
            chunk_size = policy.chunk_size(),
            overlap = policy.overlap(),
            "Initializing retrieval service"
        );
        Ok(Self::new(
            Arc::new(Embedder::from_config(config)),
            RateLimiter::new(config.rate_limit_per_minute, config.rate_limit_max_clients),
            policy,
            EmbeddingSchedule {
                batch_size: config.embedding_batch_size,
                concurrency: config.embedding_concurrency,
            },
        ))
    }

    /// Replace the exact flat index with another implementation.
    pub fn with_index_builder(mut self, builder: Box<dyn IndexBuilder>) -> Self {
        self.index_builder = builder;
        self
    }

    /// Snapshot of the active document, if any.
    pub fn current_state(&self) -> Option<Arc<DocumentState>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Chunk, embed, and index `pages`, then atomically install the new document.
    ///
    /// On any failure the previously active document, or its absence, is left untouched.
    pub async fn upload(&self, pages: Vec<PageText>) -> Result<UploadOutcome, RetrievalError> {
        let chunks = chunk_pages(&pages, &self.policy);
        if chunks.is_empty() {
            tracing::warn!(pages = pages.len(), "Upload produced no chunks");
            return Err(RetrievalError::EmptyInput);
        }
        let page_count = pages
            .iter()
            .filter(|page| !page.text.trim().is_empty())
            .count();
        tracing::info!(pages = page_count, chunks = chunks.len(), "Indexing document");

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embed_in_order(texts).await?;
        let index = self.index_builder.build(vectors)?;
        let state = DocumentState::new(chunks, index)?;
        let chunk_count = state.chunks().len();
        let dimension = state.index().dimension();

        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(state));

        self.metrics.record_document(chunk_count as u64);
        tracing::info!(chunks = chunk_count, dimension, "Document indexed");
        Ok(UploadOutcome {
            chunk_count,
            page_count,
        })
    }

    /// Embed `texts` in batches with bounded concurrency, reassembled in input order.
    async fn embed_in_order(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let batches: Vec<Vec<String>> = texts
            .chunks(self.schedule.batch_size)
            .map(<[String]>::to_vec)
            .collect();
        let embedder = &self.embedder;

        let embedded: Vec<Vec<Vec<f32>>> = stream::iter(batches)
            .map(|batch| embedder.embed_batch(batch))
            .buffered(self.schedule.concurrency)
            .try_collect()
            .await?;
        Ok(embedded.into_iter().flatten().collect())
    }

    /// Retrieve the `top_k` chunks nearest to `question` on behalf of `client_id`.
    ///
    /// Rejected clients are turned away before any embedding work happens.
    pub async fn query(
        &self,
        question: &str,
        top_k: usize,
        client_id: &str,
    ) -> Result<QueryOutcome, RetrievalError> {
        if !self.rate_limiter.allow(client_id) {
            self.metrics.record_rejection();
            tracing::warn!(client_id, "Rate limit exceeded");
            return Err(RetrievalError::RateLimited {
                client_id: client_id.to_string(),
            });
        }

        let state = self.current_state().ok_or(RetrievalError::NotIndexed)?;
        let vector = self.embedder.embed(question).await?;
        let neighbors = state.index().search(&vector, top_k)?;
        let chunks = state.chunks();

        let results = neighbors
            .into_iter()
            .filter_map(|neighbor| {
                chunks.get(neighbor.index).map(|chunk| RetrievedChunk {
                    chunk_index: neighbor.index,
                    text: chunk.text.clone(),
                    page: chunk.page,
                    distance: neighbor.distance,
                })
            })
            .collect::<Vec<_>>();

        self.metrics.record_query();
        tracing::debug!(client_id, top_k, hits = results.len(), "Query served");
        Ok(QueryOutcome { results })
    }

    /// Return the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl RetrievalApi for RetrievalService {
    async fn upload(&self, pages: Vec<PageText>) -> Result<UploadOutcome, RetrievalError> {
        RetrievalService::upload(self, pages).await
    }

    async fn query(
        &self,
        question: &str,
        top_k: usize,
        client_id: &str,
    ) -> Result<QueryOutcome, RetrievalError> {
        RetrievalService::query(self, question, top_k, client_id).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        RetrievalService::metrics_snapshot(self)
    }
}

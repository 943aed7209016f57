//! Embedding clients and the lazily-initialized [`Embedder`] shared by the retrieval pipeline.
//!
//! Backends implement [`EmbeddingClient`]. The [`Embedder`] wraps a loader that constructs the
//! backend on first use and caches it for the rest of the process; once a model is loaded it is
//! never reloaded or invalidated.

mod hashing;
mod ollama;

pub use hashing::HashingClient;
pub use ollama::OllamaEmbeddingClient;

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The embedding model could not be loaded.
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce one embedding vector per supplied text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Output dimensionality of the loaded model.
    fn dimension(&self) -> usize;
}

type LoadResult = Result<Arc<dyn EmbeddingClient>, EmbeddingError>;
type ModelLoader = Box<dyn Fn() -> BoxFuture<'static, LoadResult> + Send + Sync>;

/// Text-to-vector front end with one-time model initialization.
pub struct Embedder {
    model: OnceCell<Arc<dyn EmbeddingClient>>,
    loader: Option<ModelLoader>,
}

impl Embedder {
    /// Defer model construction to the first embedding call.
    ///
    /// A failed load is reported to that caller and attempted again by the next one; a
    /// successful load is kept for the process lifetime.
    pub fn lazy<F, Fut>(loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LoadResult> + Send + 'static,
    {
        Self {
            model: OnceCell::new(),
            loader: Some(Box::new(move || -> BoxFuture<'static, LoadResult> {
                Box::pin(loader())
            })),
        }
    }

    /// Wrap an already constructed client.
    pub fn from_client(client: Arc<dyn EmbeddingClient>) -> Self {
        Self {
            model: OnceCell::from(client),
            loader: None,
        }
    }

    /// Build an embedder for the configured provider.
    pub fn from_config(config: &Config) -> Self {
        match config.embedding_provider {
            EmbeddingProvider::Hashing => {
                let dimension = config.embedding_dimension;
                Self::lazy(move || async move {
                    let client = HashingClient::new(dimension)?;
                    Ok::<_, EmbeddingError>(Arc::new(client) as Arc<dyn EmbeddingClient>)
                })
            }
            EmbeddingProvider::Ollama => {
                let base_url = config.ollama_url.clone();
                let model = config.embedding_model.clone();
                Self::lazy(move || {
                    let base_url = base_url.clone();
                    let model = model.clone();
                    async move {
                        let client = OllamaEmbeddingClient::connect(base_url, model).await?;
                        Ok::<_, EmbeddingError>(Arc::new(client) as Arc<dyn EmbeddingClient>)
                    }
                })
            }
        }
    }

    /// Whether the underlying model has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// Dimension of the loaded model, if loaded.
    pub fn dimension(&self) -> Option<usize> {
        self.model.get().map(|client| client.dimension())
    }

    async fn client(&self) -> Result<&Arc<dyn EmbeddingClient>, EmbeddingError> {
        self.model
            .get_or_try_init(|| async {
                let loader = self.loader.as_ref().ok_or_else(|| {
                    EmbeddingError::ModelUnavailable("no embedding model configured".into())
                })?;
                tracing::info!("Loading embedding model");
                let client = loader().await?;
                tracing::info!(dimension = client.dimension(), "Embedding model loaded");
                Ok::<_, EmbeddingError>(client)
            })
            .await
    }

    /// Embed a batch of texts, guaranteeing one vector per input in input order.
    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();
        let vectors = self.client().await?.generate_embeddings(texts).await?;
        if vectors.len() != expected {
            return Err(EmbeddingError::GenerationFailed(format!(
                "provider returned {} vectors for {expected} inputs",
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    /// Embed a single text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(vec![text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::GenerationFailed("provider returned no vectors".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ShortClient;

    #[async_trait]
    impl EmbeddingClient for ShortClient {
        async fn generate_embeddings(
            &self,
            _texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(Vec::new())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn lazy_embedder_loads_model_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let embedder = Embedder::lazy(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let client = HashingClient::new(8)?;
                Ok::<_, EmbeddingError>(Arc::new(client) as Arc<dyn EmbeddingClient>)
            }
        });

        assert!(!embedder.is_loaded());
        let first = embedder.embed("hello world").await.expect("embedding");
        let second = embedder.embed("hello world").await.expect("embedding");

        assert_eq!(first, second);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(embedder.dimension(), Some(8));
    }

    #[tokio::test]
    async fn load_failure_surfaces_as_error() {
        let embedder = Embedder::lazy(|| async {
            Err(EmbeddingError::ModelUnavailable("missing weights".into()))
        });

        let error = embedder.embed("text").await.unwrap_err();
        assert!(matches!(error, EmbeddingError::ModelUnavailable(_)));
        assert!(!embedder.is_loaded());
    }

    #[tokio::test]
    async fn short_provider_response_is_rejected() {
        let embedder = Embedder::from_client(Arc::new(ShortClient));
        let error = embedder
            .embed_batch(vec!["a".into(), "b".into()])
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            EmbeddingError::GenerationFailed(message) if message.contains("0 vectors")
        ));
    }

    #[tokio::test]
    async fn empty_batch_skips_model_load() {
        let embedder = Embedder::lazy(|| async {
            Err(EmbeddingError::ModelUnavailable("should not load".into()))
        });
        let vectors = embedder.embed_batch(Vec::new()).await.expect("empty batch");
        assert!(vectors.is_empty());
    }
}

//! Ollama-backed embedding client using the `/api/embed` endpoint.

use super::{EmbeddingClient, EmbeddingError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

const PROBE_TEXT: &str = "dimension probe";

/// Embedding client issuing HTTP requests to a local Ollama runtime.
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddingClient {
    /// Connect to Ollama and load `model`, probing it once to learn its output dimension.
    pub async fn connect(base_url: String, model: String) -> Result<Self, EmbeddingError> {
        let http = Client::builder()
            .user_agent("docqa/embed")
            .build()
            .map_err(|error| EmbeddingError::ModelUnavailable(error.to_string()))?;
        let mut client = Self {
            http,
            base_url,
            model,
            dimension: 0,
        };

        let probe = client
            .request(vec![PROBE_TEXT.to_string()])
            .await
            .map_err(|error| EmbeddingError::ModelUnavailable(error.to_string()))?;
        let dimension = probe.first().map(Vec::len).unwrap_or(0);
        if dimension == 0 {
            return Err(EmbeddingError::ModelUnavailable(format!(
                "model '{}' returned an empty probe embedding",
                client.model
            )));
        }
        client.dimension = dimension;
        tracing::debug!(
            url = %client.base_url,
            model = %client.model,
            dimension,
            "Connected to Ollama embeddings"
        );
        Ok(client)
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }

    async fn request(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let payload = json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                EmbeddingError::GenerationFailed(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(EmbeddingError::ModelUnavailable(format!(
                "Ollama model '{}' not found",
                self.model
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: EmbedResponse = response.json().await.map_err(|error| {
            EmbeddingError::GenerationFailed(format!("failed to decode Ollama response: {error}"))
        })?;
        Ok(body.embeddings)
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        tracing::debug!(model = %self.model, count = texts.len(), "Requesting embeddings");
        self.request(texts).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

//! Answer synthesis from retrieved chunks via a local language model.
//!
//! Generation is optional; when no provider is configured the HTTP layer still returns the
//! retrieved context. The Ollama-backed client mirrors the embedding adapter by issuing HTTP
//! requests directly to the runtime.

pub mod json;
pub mod prompts;

use crate::config::{Config, GenerationProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

const SYSTEM_PROMPT: &str = "You are a precise document analysis assistant.";
const MAX_ANSWER_TOKENS: u32 = 512;

/// Errors surfaced while generating an answer.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Provider was explicitly disabled or unreachable.
    #[error("Generation provider unavailable: {0}")]
    Unavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by answer generation providers.
#[async_trait]
pub trait AnswerClient: Send + Sync {
    /// Answer `prompt` given the retrieved `context` passages, nearest first.
    async fn generate(&self, prompt: &str, context: &[String]) -> Result<String, GenerationError>;
}

/// Build an answer client based on configuration.
pub fn get_answer_client(
    config: &Config,
) -> Result<Option<Box<dyn AnswerClient>>, GenerationError> {
    match config.generation_provider {
        GenerationProvider::None => Ok(None),
        GenerationProvider::Ollama => Ok(Some(Box::new(OllamaAnswerClient::new(
            config.ollama_url.clone(),
            config.generation_model.clone(),
        )?))),
    }
}

/// Answer client backed by Ollama's `/api/generate` endpoint.
pub struct OllamaAnswerClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaAnswerClient {
    /// Construct a client for `model` served at `base_url`.
    pub fn new(base_url: String, model: String) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .user_agent("docqa/generate")
            .build()
            .map_err(|error| GenerationError::Unavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl AnswerClient for OllamaAnswerClient {
    async fn generate(&self, prompt: &str, context: &[String]) -> Result<String, GenerationError> {
        let full_prompt = if context.is_empty() {
            prompt.to_string()
        } else {
            format!("Context:\n{}\n\n{prompt}", context.join("\n\n"))
        };
        let payload = json!({
            "model": self.model,
            "system": SYSTEM_PROMPT,
            "prompt": full_prompt,
            "stream": false,
            "options": {
                "temperature": 0.2,
                "num_predict": MAX_ANSWER_TOKENS,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationError::Unavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GenerationError::Unavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(GenerationError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}

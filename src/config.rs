use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Configuration was already installed in the global cache.
    #[error("Configuration already initialized")]
    AlreadyInitialized,
}

/// Runtime configuration for the document QA server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Embedding backend used to vectorize chunks and questions.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of vectors produced by the hashing provider.
    pub embedding_dimension: usize,
    /// Number of embedding batches kept in flight during an upload.
    pub embedding_concurrency: usize,
    /// Number of chunks sent per embedding request.
    pub embedding_batch_size: usize,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Chunk window in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Requests admitted per client per one-minute window.
    pub rate_limit_per_minute: u32,
    /// Number of tracked clients that triggers a sweep of stale windows.
    pub rate_limit_max_clients: usize,
    /// Default `top_k` for question answering.
    pub default_top_k: usize,
    /// Default `top_k` for form filling.
    pub fill_form_top_k: usize,
    /// Upper bound applied to any requested `top_k`.
    pub max_top_k: usize,
    /// Backend used to synthesize answers from retrieved chunks.
    pub generation_provider: GenerationProvider,
    /// Model identifier used for answer synthesis.
    pub generation_model: String,
    /// Browser origin allowed by the CORS layer.
    pub cors_allowed_origin: String,
    /// File that receives logs; daily files under `logs/` when unset.
    pub log_file: Option<String>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic in-process feature hashing.
    Hashing,
    /// Local Ollama runtime.
    Ollama,
}

/// Supported answer generation backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// Answer generation disabled; retrieval results are still returned.
    None,
    /// Local Ollama runtime.
    Ollama,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: None,
            embedding_provider: EmbeddingProvider::Hashing,
            embedding_model: "all-minilm".into(),
            embedding_dimension: 384,
            embedding_concurrency: 4,
            embedding_batch_size: 16,
            ollama_url: "http://127.0.0.1:11434".into(),
            chunk_size: 500,
            chunk_overlap: 50,
            rate_limit_per_minute: 30,
            rate_limit_max_clients: 10_000,
            default_top_k: 3,
            fill_form_top_k: 4,
            max_top_k: 50,
            generation_provider: GenerationProvider::None,
            generation_model: "llama3.1:8b".into(),
            cors_allowed_origin: "http://localhost:3000".into(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            server_port: parse_optional("SERVER_PORT")?,
            embedding_provider: parse_or("EMBEDDING_PROVIDER", defaults.embedding_provider)?,
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            embedding_dimension: parse_or("EMBEDDING_DIMENSION", defaults.embedding_dimension)?,
            embedding_concurrency: parse_or(
                "EMBEDDING_CONCURRENCY",
                defaults.embedding_concurrency,
            )?,
            embedding_batch_size: parse_or("EMBEDDING_BATCH_SIZE", defaults.embedding_batch_size)?,
            ollama_url: load_env_optional("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            chunk_size: parse_or("CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: parse_or("CHUNK_OVERLAP", defaults.chunk_overlap)?,
            rate_limit_per_minute: parse_or(
                "RATE_LIMIT_PER_MINUTE",
                defaults.rate_limit_per_minute,
            )?,
            rate_limit_max_clients: parse_or(
                "RATE_LIMIT_MAX_CLIENTS",
                defaults.rate_limit_max_clients,
            )?,
            default_top_k: parse_or("DEFAULT_TOP_K", defaults.default_top_k)?,
            fill_form_top_k: parse_or("FILL_FORM_TOP_K", defaults.fill_form_top_k)?,
            max_top_k: parse_or("MAX_TOP_K", defaults.max_top_k)?,
            generation_provider: parse_or("GENERATION_PROVIDER", defaults.generation_provider)?,
            generation_model: load_env_optional("GENERATION_MODEL")
                .unwrap_or(defaults.generation_model),
            cors_allowed_origin: load_env_optional("CORS_ALLOWED_ORIGIN")
                .unwrap_or(defaults.cors_allowed_origin),
            log_file: load_env_optional("DOCQA_LOG_FILE"),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the retrieval pipeline cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_SIZE".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::InvalidValue("CHUNK_OVERLAP".into()));
        }
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.embedding_concurrency == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_CONCURRENCY".into()));
        }
        if self.embedding_batch_size == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_BATCH_SIZE".into()));
        }
        if self.rate_limit_per_minute == 0 {
            return Err(ConfigError::InvalidValue("RATE_LIMIT_PER_MINUTE".into()));
        }
        if self.max_top_k == 0 {
            return Err(ConfigError::InvalidValue("MAX_TOP_K".into()));
        }
        Ok(())
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    Ok(parse_optional(key)?.unwrap_or(default))
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hashing" => Ok(Self::Hashing),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

impl FromStr for GenerationProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "disabled" => Ok(Self::None),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, falling back to defaults when initialization was skipped.
pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(Config::default)
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        server_port = ?config.server_port,
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        rate_limit_per_minute = config.rate_limit_per_minute,
        generation_provider = ?config.generation_provider,
        "Loaded configuration"
    );
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    Ok(get_config())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_pipeline() {
        let config = Config::default();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.rate_limit_per_minute, 30);
        assert_eq!(config.default_top_k, 3);
        assert_eq!(config.fill_form_top_k, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_overlap_not_smaller_than_chunk_size() {
        let config = Config {
            chunk_size: 100,
            chunk_overlap: 100,
            ..Config::default()
        };
        let error = config.validate().unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "CHUNK_OVERLAP"));
    }

    #[test]
    fn validate_rejects_zero_quota() {
        let config = Config {
            rate_limit_per_minute: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    const ENV_KEYS: [&str; 5] = [
        "SERVER_PORT",
        "CHUNK_SIZE",
        "CHUNK_OVERLAP",
        "EMBEDDING_PROVIDER",
        "DOCQA_LOG_FILE",
    ];

    fn set_env(key: &str, value: &str) {
        // SAFETY: only this test touches these variables, and it runs them in sequence.
        unsafe { env::set_var(key, value) }
    }

    fn clear_env() {
        for key in ENV_KEYS {
            // SAFETY: see `set_env`.
            unsafe { env::remove_var(key) }
        }
    }

    // One test owns the process environment so the cases cannot interleave.
    #[test]
    fn from_env_reads_parses_and_validates_variables() {
        clear_env();
        let config = Config::from_env().expect("defaults load");
        assert_eq!(config.server_port, None);
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.log_file, None);

        set_env("SERVER_PORT", " 8042 ");
        set_env("CHUNK_SIZE", "800");
        set_env("CHUNK_OVERLAP", "120");
        set_env("EMBEDDING_PROVIDER", "Ollama");
        set_env("DOCQA_LOG_FILE", "/tmp/docqa-test.log");
        let config = Config::from_env().expect("overrides load");
        assert_eq!(config.server_port, Some(8042));
        assert_eq!(config.chunk_size, 800);
        assert_eq!(config.chunk_overlap, 120);
        assert_eq!(config.embedding_provider, EmbeddingProvider::Ollama);
        assert_eq!(config.log_file.as_deref(), Some("/tmp/docqa-test.log"));

        set_env("CHUNK_SIZE", "five hundred");
        let error = Config::from_env().unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "CHUNK_SIZE"));

        set_env("CHUNK_SIZE", "100");
        set_env("CHUNK_OVERLAP", "100");
        let error = Config::from_env().unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "CHUNK_OVERLAP"));

        set_env("CHUNK_OVERLAP", "10");
        set_env("EMBEDDING_PROVIDER", "qdrant");
        let error = Config::from_env().unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "EMBEDDING_PROVIDER"));

        set_env("EMBEDDING_PROVIDER", "  ");
        set_env("SERVER_PORT", "");
        let config = Config::from_env().expect("blank values fall back to defaults");
        assert_eq!(config.server_port, None);
        assert_eq!(config.embedding_provider, EmbeddingProvider::Hashing);

        clear_env();
    }

    #[test]
    fn providers_parse_case_insensitively() {
        assert_eq!("Ollama".parse(), Ok(EmbeddingProvider::Ollama));
        assert_eq!("HASHING".parse(), Ok(EmbeddingProvider::Hashing));
        assert_eq!("disabled".parse(), Ok(GenerationProvider::None));
        assert!("qdrant".parse::<EmbeddingProvider>().is_err());
    }
}

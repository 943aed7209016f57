#![deny(missing_docs)]

//! Core library for the docqa document question-answering server.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Upload text extraction and cleanup.
pub mod extract;
/// Answer generation clients, prompts, and output parsing.
pub mod generation;
/// Structured logging and tracing setup.
pub mod logging;
/// Upload and query metrics helpers.
pub mod metrics;
/// Fixed-window per-client rate limiting.
pub mod rate_limit;
/// Chunking, vector indexing, and nearest-neighbor retrieval.
pub mod retrieval;

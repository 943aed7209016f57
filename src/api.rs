//! HTTP surface for the document QA service.
//!
//! This module exposes a compact Axum router:
//!
//! - `GET /` – Liveness probe.
//! - `POST /upload?filename=<name>` – Raw file body (PDF or text). Extracts and cleans pages,
//!   then chunks, embeds, and indexes them, replacing the active document.
//! - `POST /upload/pages` – Pre-extracted pages as JSON, indexed the same way.
//! - `POST /query` – Retrieve the nearest chunks for a question and synthesize an answer.
//! - `POST /fill-form` – Retrieve context for a list of fields and ask for strict JSON values.
//! - `POST /analyze/certificate` – Extract a fixed set of certificate fields as JSON.
//! - `GET /metrics` – Upload and query counters.
//! - `GET /commands` – Machine-readable command catalog.
//!
//! Query endpoints are rate limited per client IP. Answer generation is optional; without a
//! provider the endpoints still return the retrieved context.

use crate::config::get_config;
use crate::extract::{ExtractError, clean_pages, extract_pages};
use crate::generation::{
    AnswerClient,
    json::parse_model_json,
    prompts::{
        DEFAULT_CERTIFICATE_QUERY, certificate_prompt, excerpt, fill_form_prompt, question_prompt,
    },
};
use crate::retrieval::{PageText, QueryOutcome, RetrievalApi, RetrievalError};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{ConnectInfo, DefaultBodyLimit, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Largest accepted upload body.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Shared state handed to every handler.
pub struct AppState<S> {
    service: Arc<S>,
    answers: Option<Arc<dyn AnswerClient>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            answers: self.answers.clone(),
        }
    }
}

/// Build the HTTP router exposing the upload and query surface.
pub fn create_router<S>(service: Arc<S>, answers: Option<Arc<dyn AnswerClient>>) -> Router
where
    S: RetrievalApi + 'static,
{
    let state = AppState { service, answers };
    Router::new()
        .route("/", get(root))
        .route("/upload", post(upload_file::<S>))
        .route("/upload/pages", post(upload_pages::<S>))
        .route("/query", post(query::<S>))
        .route("/fill-form", post(fill_form::<S>))
        .route("/analyze/certificate", post(analyze_certificate::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    let origin = &get_config().cors_allowed_origin;
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match HeaderValue::from_str(origin) {
        Ok(value) if origin != "*" => layer.allow_origin(value),
        Ok(_) => layer.allow_origin(Any),
        Err(_) => {
            tracing::warn!(
                origin = %origin,
                "Invalid CORS origin; allowing GET/POST from any origin"
            );
            layer
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST])
        }
    }
}

/// Resolve the client identifier used for rate limiting.
fn client_id(connect_info: Option<ConnectInfo<SocketAddr>>) -> String {
    connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn clamp_top_k(requested: Option<usize>, default: usize) -> usize {
    requested
        .unwrap_or(default)
        .clamp(1, get_config().max_top_k)
}

async fn root() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Document QA service running",
    }))
}

/// Query string for `POST /upload`.
#[derive(Deserialize)]
struct UploadParams {
    /// Original file name; a `.pdf` suffix selects PDF extraction.
    #[serde(default)]
    filename: Option<String>,
}

/// Success response for the upload endpoints.
#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
    num_chunks: usize,
}

/// Extract pages from a raw upload and index them.
async fn upload_file<S>(
    State(state): State<AppState<S>>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<Json<UploadResponse>, AppError>
where
    S: RetrievalApi,
{
    let filename = params.filename.unwrap_or_default();
    tracing::info!(filename = %filename, bytes = body.len(), "Upload received");
    let pages = tokio::task::spawn_blocking(move || extract_pages(&body, &filename))
        .await
        .map_err(|error| AppError::Extract(ExtractError::Pdf(error.to_string())))??;
    index_pages(&state, pages).await
}

/// Request body for `POST /upload/pages`.
#[derive(Deserialize)]
struct UploadPagesRequest {
    pages: Vec<PageText>,
}

async fn upload_pages<S>(
    State(state): State<AppState<S>>,
    Json(request): Json<UploadPagesRequest>,
) -> Result<Json<UploadResponse>, AppError>
where
    S: RetrievalApi,
{
    let pages = clean_pages(request.pages);
    if pages.is_empty() {
        return Err(AppError::Extract(ExtractError::Empty));
    }
    index_pages(&state, pages).await
}

async fn index_pages<S>(
    state: &AppState<S>,
    pages: Vec<PageText>,
) -> Result<Json<UploadResponse>, AppError>
where
    S: RetrievalApi,
{
    let outcome = state.service.upload(pages).await.map_err(AppError::Upload)?;
    tracing::info!(
        chunks = outcome.chunk_count,
        pages = outcome.page_count,
        "Upload request completed"
    );
    Ok(Json(UploadResponse {
        message: "document indexed",
        num_chunks: outcome.chunk_count,
    }))
}

/// Request body for `POST /query` and `POST /analyze/certificate`.
#[derive(Deserialize)]
struct QueryRequest {
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    top_k: Option<usize>,
}

/// Source reference attached to an answer.
#[derive(Serialize)]
struct SourceExcerpt {
    page: Option<u32>,
    excerpt: String,
}

/// Response body for `POST /query`.
#[derive(Serialize)]
struct QueryResponse {
    answer: String,
    sources: Vec<SourceExcerpt>,
}

async fn query<S>(
    State(state): State<AppState<S>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError>
where
    S: RetrievalApi,
{
    let question = request
        .question
        .map(|question| question.trim().to_string())
        .filter(|question| !question.is_empty())
        .ok_or_else(|| AppError::BadRequest("question must not be empty".into()))?;
    let top_k = clamp_top_k(request.top_k, get_config().default_top_k);
    let client = client_id(connect_info);

    let retrieved = state
        .service
        .query(&question, top_k, &client)
        .await
        .map_err(AppError::Query)?;
    let context = retrieved.texts();
    let answer = match generate(&state, &question_prompt(&context, &question), &context).await {
        Ok(answer) => answer.replace("\\n", "\n").trim().to_string(),
        Err(message) => {
            tracing::warn!(error = %message, "Answer generation unavailable");
            String::new()
        }
    };

    Ok(Json(QueryResponse {
        answer,
        sources: sources(&retrieved),
    }))
}

fn sources(retrieved: &QueryOutcome) -> Vec<SourceExcerpt> {
    retrieved
        .results
        .iter()
        .map(|hit| SourceExcerpt {
            page: hit.page,
            excerpt: excerpt(&hit.text),
        })
        .collect()
}

/// Request body for `POST /fill-form`.
#[derive(Deserialize)]
struct FillFormRequest {
    fields: Vec<String>,
    #[serde(default)]
    top_k: Option<usize>,
}

async fn fill_form<S>(
    State(state): State<AppState<S>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<FillFormRequest>,
) -> Result<Json<Value>, AppError>
where
    S: RetrievalApi,
{
    let fields: Vec<String> = request
        .fields
        .into_iter()
        .map(|field| field.trim().to_string())
        .filter(|field| !field.is_empty())
        .collect();
    if fields.is_empty() {
        return Err(AppError::BadRequest("fields must not be empty".into()));
    }
    let top_k = clamp_top_k(request.top_k, get_config().fill_form_top_k);
    let client = client_id(connect_info);

    let retrieved = state
        .service
        .query(&fields.join(" "), top_k, &client)
        .await
        .map_err(AppError::Query)?;
    let context = retrieved.texts();
    let prompt = fill_form_prompt(&fields, &context);
    Ok(Json(structured_response(&state, "result", &prompt, context).await))
}

async fn analyze_certificate<S>(
    State(state): State<AppState<S>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<Value>, AppError>
where
    S: RetrievalApi,
{
    let question = request
        .question
        .map(|question| question.trim().to_string())
        .filter(|question| !question.is_empty())
        .unwrap_or_else(|| DEFAULT_CERTIFICATE_QUERY.to_string());
    let top_k = clamp_top_k(request.top_k, get_config().default_top_k);
    let client = client_id(connect_info);

    let retrieved = state
        .service
        .query(&question, top_k, &client)
        .await
        .map_err(AppError::Query)?;
    let context = retrieved.texts();
    let prompt = certificate_prompt(&context);
    Ok(Json(structured_response(&state, "parsed", &prompt, context).await))
}

/// Generate, parse leniently, and package the model output alongside its context.
async fn structured_response<S>(
    state: &AppState<S>,
    key: &str,
    prompt: &str,
    context: Vec<String>,
) -> Value {
    let raw = match generate(state, prompt, &context).await {
        Ok(raw) => raw,
        Err(message) => {
            tracing::warn!(error = %message, "Structured generation unavailable");
            String::new()
        }
    };

    let mut body = serde_json::Map::new();
    if raw.trim().is_empty() {
        body.insert(key.to_string(), Value::Null);
        body.insert("error".into(), json!("LLM returned empty response"));
    } else {
        let parsed = parse_model_json(&raw).unwrap_or(Value::Null);
        body.insert(key.to_string(), parsed);
    }
    body.insert("raw".into(), json!(raw));
    body.insert("context".into(), json!(context));
    Value::Object(body)
}

async fn generate<S>(
    state: &AppState<S>,
    prompt: &str,
    context: &[String],
) -> Result<String, String> {
    let Some(client) = state.answers.as_ref() else {
        return Err("no generation provider configured".into());
    };
    client
        .generate(prompt, context)
        .await
        .map_err(|error| error.to_string())
}

/// Return upload and query counters.
async fn get_metrics<S>(State(state): State<AppState<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: RetrievalApi,
{
    Json(state.service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery by clients and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "upload",
                method: "POST",
                path: "/upload?filename=<name>",
                description: concat!(
                    "Upload a PDF or text file as the raw request body. The document is chunked, ",
                    "embedded, and indexed, replacing any previous document. ",
                    "Response returns { \"num_chunks\": number }."
                ),
                request_example: None,
            },
            CommandDescriptor {
                name: "upload_pages",
                method: "POST",
                path: "/upload/pages",
                description: "Index pre-extracted pages, replacing any previous document.",
                request_example: Some(json!({
                    "pages": [{ "page": 1, "text": "Page contents" }]
                })),
            },
            CommandDescriptor {
                name: "query",
                method: "POST",
                path: "/query",
                description: concat!(
                    "Answer a question from the indexed document. ",
                    "Returns { \"answer\", \"sources\": [{ \"page\", \"excerpt\" }] }."
                ),
                request_example: Some(json!({
                    "question": "Who issued the certificate?",
                    "top_k": 3
                })),
            },
            CommandDescriptor {
                name: "fill_form",
                method: "POST",
                path: "/fill-form",
                description: "Extract the named fields from the indexed document as JSON.",
                request_example: Some(json!({
                    "fields": ["name", "date_of_birth"],
                    "top_k": 4
                })),
            },
            CommandDescriptor {
                name: "analyze_certificate",
                method: "POST",
                path: "/analyze/certificate",
                description: "Extract standard certificate fields from the indexed document.",
                request_example: Some(json!({ "question": "extract certificate fields" })),
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return upload and query counters.",
                request_example: None,
            },
        ],
    })
}

/// Error returned by handlers, mapped onto HTTP status codes.
enum AppError {
    /// Indexing a new document failed.
    Upload(RetrievalError),
    /// Retrieving chunks for a question failed.
    Query(RetrievalError),
    Extract(ExtractError),
    BadRequest(String),
}

impl AppError {
    fn retrieval(&self) -> Option<&RetrievalError> {
        match self {
            Self::Upload(error) | Self::Query(error) => Some(error),
            Self::Extract(_) | Self::BadRequest(_) => None,
        }
    }

    fn status(&self) -> StatusCode {
        match self.retrieval() {
            Some(RetrievalError::RateLimited { .. }) => StatusCode::TOO_MANY_REQUESTS,
            Some(RetrievalError::NotIndexed | RetrievalError::EmptyInput) => {
                StatusCode::BAD_REQUEST
            }
            Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
            None => StatusCode::BAD_REQUEST,
        }
    }

    fn detail(&self) -> String {
        match self {
            Self::Upload(RetrievalError::Embedding(_) | RetrievalError::Index(_)) => {
                "Indexing failed".into()
            }
            Self::Query(RetrievalError::Embedding(_) | RetrievalError::Index(_)) => {
                "Retrieval failed".into()
            }
            Self::Upload(RetrievalError::RateLimited { .. })
            | Self::Query(RetrievalError::RateLimited { .. }) => "rate limit exceeded".into(),
            Self::Upload(error) | Self::Query(error) => error.to_string(),
            Self::Extract(error) => error.to_string(),
            Self::BadRequest(message) => message.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Some(error) = self.retrieval().filter(|_| status.is_server_error()) {
            tracing::error!(error = %error, "Request failed");
        }
        (status, Json(json!({ "detail": self.detail() }))).into_response()
    }
}

impl From<ExtractError> for AppError {
    fn from(inner: ExtractError) -> Self {
        Self::Extract(inner)
    }
}

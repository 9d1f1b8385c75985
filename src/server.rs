//! HTTP API for the assistant.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/chat` | `{ "message" }` → `{ "answer", "source" }` |
//! | `GET`  | `/lectures` | Cached timetable |
//! | `POST` | `/documents` | Store a knowledge document |
//! | `POST` | `/documents/search` | Similarity search over knowledge documents |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `embeddings_disabled` (400),
//! `internal` (500).
//!
//! `/chat` never fails once the request is valid: generation problems are
//! reported in the answer text with `source = "error"`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::chat::{ChatReply, ChatService};
use crate::config::Config;
use crate::db;
use crate::documents::{save_document, search_documents, DEFAULT_SEARCH_LIMIT};
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::models::{DocumentMatch, Lecture};

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub pool: SqlitePool,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub embeddings_enabled: bool,
}

impl AppState {
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        let chat = ChatService::from_config(config, pool.clone())?;
        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config.embedding)?);
        Ok(Self {
            chat: Arc::new(chat),
            pool,
            embedder,
            embeddings_enabled: config.embedding.is_enabled(),
        })
    }
}

/// Starts the HTTP server on `[server].bind` and runs until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "server listening");
    println!("Assistant listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/chat", post(handle_chat))
        .route("/lectures", get(handle_lectures))
        .route("/documents", post(handle_save_document))
        .route("/documents/search", post(handle_search_documents))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn embeddings_disabled() -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "embeddings_disabled",
        message: "embedding provider is disabled".to_string(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    error!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: err.to_string(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatReply>, AppError> {
    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    Ok(Json(state.chat.answer(&req.message).await))
}

// ============ GET /lectures ============

#[derive(Deserialize)]
struct LecturesQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct LecturesResponse {
    count: usize,
    lectures: Vec<Lecture>,
}

async fn handle_lectures(
    State(state): State<AppState>,
    Query(query): Query<LecturesQuery>,
) -> Json<LecturesResponse> {
    let lectures = state.chat.lectures().await;
    let limit = query.limit.unwrap_or(lectures.len());
    Json(LecturesResponse {
        count: lectures.len(),
        lectures: lectures.iter().take(limit).cloned().collect(),
    })
}

// ============ POST /documents ============

#[derive(Deserialize)]
struct SaveDocumentRequest {
    content: String,
    #[serde(default)]
    metadata: serde_json::Value,
}

#[derive(Serialize)]
struct SaveDocumentResponse {
    id: String,
    created: bool,
}

async fn handle_save_document(
    State(state): State<AppState>,
    Json(req): Json<SaveDocumentRequest>,
) -> Result<Json<SaveDocumentResponse>, AppError> {
    if req.content.trim().is_empty() {
        return Err(bad_request("content must not be empty"));
    }
    if !state.embeddings_enabled {
        return Err(embeddings_disabled());
    }

    let saved = save_document(&state.pool, state.embedder.as_ref(), &req.content, req.metadata)
        .await
        .map_err(internal)?;

    Ok(Json(SaveDocumentResponse {
        id: saved.document.id,
        created: saved.created,
    }))
}

// ============ POST /documents/search ============

#[derive(Deserialize)]
struct SearchDocumentsRequest {
    query: String,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct SearchDocumentsResponse {
    results: Vec<DocumentMatch>,
}

async fn handle_search_documents(
    State(state): State<AppState>,
    Json(req): Json<SearchDocumentsRequest>,
) -> Result<Json<SearchDocumentsResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if !state.embeddings_enabled {
        return Err(embeddings_disabled());
    }

    let results = search_documents(
        &state.pool,
        state.embedder.as_ref(),
        &req.query,
        req.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
    )
    .await
    .map_err(internal)?;

    Ok(Json(SearchDocumentsResponse { results }))
}

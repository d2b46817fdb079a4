//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/status` | Index status and models |
//! | `GET`  | `/documents` | Indexed documents with chunk counts |
//! | `POST` | `/sync` | Sync `{"source": "..."}` (default `all`) |
//! | `POST` | `/sync/cancel` | Stop the running sync after its current document |
//! | `POST` | `/ask` | Answer `{"question": "..."}` |
//! | `POST` | `/search` | Retrieval only, `{"question": "...", "limit": 5}` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "sync_in_progress", "message": "A sync is already running. ..." } }
//! ```
//!
//! Messages are the user-facing text of [`PipelineError::user_message`];
//! details go to the log. A question with no relevant context is not an
//! error: `/ask` answers 200 with the not-found text and `"grounded": false`.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::app::App;
use crate::error::PipelineError;
use crate::models::{Answer, DocumentEntry, ScoredChunk, SyncSummary};
use crate::status::IndexStatus;

/// Bind `[server].bind` and serve until the process is stopped.
pub async fn run_server(app: Arc<App>) -> anyhow::Result<()> {
    let bind_addr = app.config().server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "HTTP server listening");
    println!("askdocs listening on http://{}", bind_addr);
    axum::serve(listener, router(app)).await?;
    Ok(())
}

pub fn router(app: Arc<App>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/documents", get(handle_documents))
        .route("/sync", post(handle_sync))
        .route("/sync/cancel", post(handle_sync_cancel))
        .route("/ask", post(handle_ask))
        .route("/search", post(handle_search))
        .layer(cors)
        .with_state(app)
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
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::EmptyQuestion => StatusCode::BAD_REQUEST,
            PipelineError::UnknownSource(_) => StatusCode::NOT_FOUND,
            PipelineError::SyncInProgress => StatusCode::CONFLICT,
            PipelineError::SourceUnavailable { .. }
            | PipelineError::EmbeddingService(_)
            | PipelineError::GenerationService(_) => StatusCode::BAD_GATEWAY,
            PipelineError::NoRelevantContext => StatusCode::NOT_FOUND,
            PipelineError::UnsupportedFormat(_) | PipelineError::ExtractionFailed { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PipelineError::Index(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %err, "request failed");
        } else {
            warn!(error = %err, "request rejected");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.user_message(),
        }
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

// ============ GET /status, GET /documents ============

async fn handle_status(State(app): State<Arc<App>>) -> Result<Json<IndexStatus>, AppError> {
    Ok(Json(app.status().await?))
}

#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<DocumentEntry>,
}

async fn handle_documents(
    State(app): State<Arc<App>>,
) -> Result<Json<DocumentsResponse>, AppError> {
    Ok(Json(DocumentsResponse {
        documents: app.documents().await?,
    }))
}

// ============ POST /sync ============

#[derive(Deserialize, Default)]
struct SyncRequest {
    #[serde(default)]
    source: Option<String>,
}

#[derive(Serialize)]
struct SyncResponse {
    summaries: Vec<SyncSummary>,
}

/// The sync runs on its own task so a client that disconnects does not
/// abort it halfway through a document.
async fn handle_sync(
    State(app): State<Arc<App>>,
    body: Option<Json<SyncRequest>>,
) -> Result<Json<SyncResponse>, AppError> {
    let target = body
        .and_then(|Json(req)| req.source)
        .unwrap_or_else(|| "all".to_string());

    let task = tokio::spawn(async move { app.sync(&target).await });
    let summaries = task
        .await
        .map_err(|e| PipelineError::Index(format!("sync task failed: {}", e)))??;
    Ok(Json(SyncResponse { summaries }))
}

#[derive(Serialize)]
struct CancelResponse {
    cancelled: bool,
}

async fn handle_sync_cancel(State(app): State<Arc<App>>) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: app.cancel_sync(),
    })
}

// ============ POST /ask, POST /search ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

async fn handle_ask(
    State(app): State<Arc<App>>,
    Json(req): Json<AskRequest>,
) -> Result<Json<Answer>, AppError> {
    match app.ask(&req.question).await {
        Ok(answer) => Ok(Json(answer)),
        Err(PipelineError::NoRelevantContext) => Ok(Json(Answer::not_found())),
        Err(e) => Err(e.into()),
    }
}

#[derive(Deserialize)]
struct SearchRequest {
    question: String,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<ScoredChunk>,
}

async fn handle_search(
    State(app): State<Arc<App>>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let results = app.search(&req.question, req.limit).await?;
    Ok(Json(SearchResponse { results }))
}

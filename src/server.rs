//! HTTP trigger surface.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ingest` | Start a guarded run over all files or the given paths |
//! | `GET`  | `/health` | Bookkeeping and extraction reachability, plus version |
//!
//! # `POST /ingest`
//!
//! ```json
//! { "model_id": "nomic-embed-text", "paths": ["a.pdf"], "sync": false }
//! ```
//!
//! Every field is optional and an empty body means "all files, in the
//! background". With `sync: true` the response is the run's status:
//!
//! ```json
//! { "status": "finished", "results": { "processed": [], "skipped": [], "errors": [] } }
//! ```
//!
//! `locked` and `finished` answer 200, `error` answers 500. Without `sync`
//! the run is spawned and the handler answers `202 Accepted`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid request body: ..." } }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::coordinator::{IngestTarget, RunCoordinator, RunRequest};
use crate::extract::TextExtractor;
use crate::health::{check_health, HealthReport};
use crate::models::RunStatus;
use crate::store::ProcessedStore;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RunCoordinator>,
    pub store: Arc<dyn ProcessedStore>,
    pub extractor: Arc<dyn TextExtractor>,
}

/// Build the router. Split from [`run_server`] so tests can bind it to an
/// ephemeral port.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ingest", post(handle_ingest))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind `bind_addr` and serve until the process is terminated.
pub async fn run_server(bind_addr: &str, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(bind = %bind_addr, "ingest server listening");
    axum::serve(listener, app).await?;
    Ok(())
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

// ============ POST /ingest ============

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IngestRequest {
    pub model_id: Option<String>,
    pub paths: Option<Vec<PathBuf>>,
    pub sync: bool,
}

impl IngestRequest {
    /// An absent or empty `paths` list means every file.
    pub fn to_run_request(&self) -> RunRequest {
        let request = match &self.paths {
            Some(paths) if !paths.is_empty() => RunRequest::paths(paths.clone()),
            _ => RunRequest::all(),
        };
        request.with_model(self.model_id.clone())
    }
}

#[derive(Serialize)]
struct AcceptedResponse {
    status: &'static str,
    message: String,
}

async fn handle_ingest(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let req: IngestRequest = if body.iter().all(u8::is_ascii_whitespace) {
        IngestRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| bad_request(format!("invalid request body: {}", e)))?
    };
    let run = req.to_run_request();

    if req.sync {
        let status = state.coordinator.run_guarded(&run).await;
        let code = match status {
            RunStatus::Error { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::OK,
        };
        return Ok((code, Json(status)).into_response());
    }

    let scope = if run.target == IngestTarget::All {
        "processing all files"
    } else {
        "for specified paths"
    };
    let coordinator = state.coordinator.clone();
    tokio::spawn(async move {
        coordinator.run_guarded(&run).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            status: "accepted",
            message: format!("ingest started in background ({})", scope),
        }),
    )
        .into_response())
}

// ============ GET /health ============

async fn handle_health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(check_health(state.store.as_ref(), state.extractor.as_ref()).await)
}

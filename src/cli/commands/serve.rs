//! HTTP API server for integration with other systems.
//!
//! Provides REST endpoints for processing a video, retrieving evidence, and
//! answering questions over the current session.

use crate::cli::Output;
use crate::config::{validate_k, Settings};
use crate::error::GlimtError;
use crate::evidence::IndexedVideo;
use crate::orchestrator::{CleanupReport, Orchestrator, QueryOutcome};
use crate::retriever::RetrievalResult;
use crate::session::{Session, SessionEvent};
use crate::video_source::resolve_input;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Shared application state.
struct AppState {
    orchestrator: Orchestrator,
    session: RwLock<Session>,
    /// Held for the duration of an ingestion so only one runs at a time.
    ingest: Mutex<()>,
    /// Read-held by every running query; write-held while frame files of an
    /// older store are deleted.
    queries: RwLock<()>,
}

impl AppState {
    fn new(orchestrator: Orchestrator, session: Session) -> Self {
        Self {
            orchestrator,
            session: RwLock::new(session),
            ingest: Mutex::new(()),
            queries: RwLock::new(()),
        }
    }

    /// The current session. The lock is released before the caller queries.
    async fn snapshot(&self) -> Session {
        self.session.read().await.clone()
    }
}

/// Run the HTTP API server.
pub async fn run_serve(host: &str, port: u16, settings: Settings) -> anyhow::Result<()> {
    let session = Session::restore(&settings)?;
    let orchestrator = Orchestrator::new(settings)?;

    if let Some(video) = session.video() {
        info!("Serving video {} ({})", video.video_id, video.title);
    }

    let state = Arc::new(AppState::new(orchestrator, session));

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Glimt API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Status", "GET  /status");
    Output::kv("Process", "POST /process");
    Output::kv("Search", "POST /search");
    Output::kv("Ask", "POST /ask");
    Output::kv("Cleanup", "POST /cleanup");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, router(state)).await?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/process", post(process))
        .route("/search", post(search))
        .route("/ask", post(ask))
        .route("/cleanup", post(cleanup))
        .layer(cors)
        .with_state(state)
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct ProcessRequest {
    /// YouTube URL/ID or local file path
    input: String,
}

#[derive(Serialize)]
struct ProcessResponse {
    video: IndexedVideo,
    captions_found: usize,
}

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    text_k: Option<usize>,
    #[serde(default)]
    image_k: Option<usize>,
}

#[derive(Serialize)]
struct StatusResponse {
    ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    video: Option<IndexedVideo>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    retryable: bool,
}

/// A library error rendered as an HTTP response.
struct ApiError(GlimtError);

impl From<GlimtError> for ApiError {
    fn from(e: GlimtError) -> Self {
        Self(e)
    }
}

fn status_for(e: &GlimtError) -> StatusCode {
    match e {
        GlimtError::EmptyQuery | GlimtError::Config(_) | GlimtError::InvalidInput(_) => {
            StatusCode::BAD_REQUEST
        }
        GlimtError::NotReady => StatusCode::CONFLICT,
        GlimtError::VideoNotFound(_) => StatusCode::NOT_FOUND,
        GlimtError::RetrievalBackend { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                retryable: self.0.is_retryable(),
            }),
        )
            .into_response()
    }
}

impl QueryRequest {
    fn k_values(&self, settings: &Settings) -> Result<(usize, usize), GlimtError> {
        let text_k = validate_k("text_k", self.text_k.unwrap_or(settings.retrieval.text_k))?;
        let image_k = validate_k("image_k", self.image_k.unwrap_or(settings.retrieval.image_k))?;
        Ok((text_k, image_k))
    }
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let session = state.snapshot().await;
    Json(StatusResponse {
        ready: session.is_ready(),
        video: session.video().cloned(),
    })
}

async fn process(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, ApiError> {
    resolve_input(&req.input)?;
    let _ingest = state.ingest.lock().await;

    state
        .session
        .write()
        .await
        .transition(SessionEvent::NewVideoSubmitted);

    let result = state.orchestrator.process_video(&req.input).await?;

    let _drained = state.queries.write().await;
    state.session.write().await.transition(result.session_event());
    state.orchestrator.retire_stale_frames(&result)?;

    Ok(Json(ProcessResponse {
        video: result.video,
        captions_found: result.captions_found,
    }))
}

async fn search(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<RetrievalResult>, ApiError> {
    let (text_k, image_k) = req.k_values(state.orchestrator.settings())?;
    let _running = state.queries.read().await;
    let session = state.snapshot().await;

    let result = state
        .orchestrator
        .search(&session, &req.query, text_k, image_k)
        .await?;

    Ok(Json(result))
}

async fn ask(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryOutcome>, ApiError> {
    let (text_k, image_k) = req.k_values(state.orchestrator.settings())?;
    let _running = state.queries.read().await;
    let session = state.snapshot().await;

    let outcome = state
        .orchestrator
        .ask_with(&session, &req.query, text_k, image_k)
        .await?;

    Ok(Json(outcome))
}

async fn cleanup(State(state): State<Arc<AppState>>) -> Result<Json<CleanupReport>, ApiError> {
    let _ingest = state.ingest.lock().await;
    let _drained = state.queries.write().await;
    let mut session = state.session.write().await;
    let report = state.orchestrator.cleanup(&mut session)?;
    Ok(Json(report))
}

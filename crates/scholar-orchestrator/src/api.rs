//! HTTP API endpoints for the Scholar orchestrator.
//!
//! # Endpoints
//!
//! - `POST /api/modules` - Start a generation run
//! - `GET /api/runs` - List runs
//! - `GET /api/runs/:id` - Get the full state of a run
//! - `GET /api/runs/:id/modules/:index/content` - Interactive document of a module
//! - `POST /api/images` - Run the standalone image tool
//! - `GET /api/health` - Liveness and active run count
//! - `GET /ws` - WebSocket progress stream
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use scholar_gateway::{GeminiConfig, GeminiGateway};
//! use scholar_orchestrator::{create_router, AppState, Config};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let gateway = GeminiGateway::new(GeminiConfig::from_env(
//!     &config.gateway.api_key_env,
//!     config.gateway.endpoint.clone(),
//!     config.gateway.timeout_secs,
//! )?)?;
//! let router = create_router(AppState::new(config, Arc::new(gateway)));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use scholar_gateway::ModelGateway;
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::{Config, GenerationMode};
use crate::error::ScholarError;
use crate::image_tool::{ImageTool, ImageToolOutcome, ImageToolRequest};
use crate::pipeline::{Pipeline, ProgressReporter};
use crate::pipeline_state::{PipelineState, RunSummary};
use crate::runs::RunRegistry;
use crate::types::Topic;
use crate::websocket::{ws_handler, EventBroadcaster};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for starting a run.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunRequest {
    /// The academic topic.
    pub topic: String,
    /// Single or multi-module. Defaults to the configured mode.
    #[serde(default)]
    pub mode: Option<GenerationMode>,
}

/// Response body for a started run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunResponse {
    /// Identifier for polling and event filtering.
    pub run_id: String,
}

/// Response body for the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: String,
    /// Runs that have not finished.
    pub active_runs: usize,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the orchestrator.
    pub config: Config,
    /// Pipeline used for every run.
    pub pipeline: Pipeline<Arc<dyn ModelGateway>>,
    /// Standalone image tool.
    pub image_tool: ImageTool<Arc<dyn ModelGateway>>,
    /// Runs started by this server.
    pub runs: RunRegistry,
    /// Event fan-out for WebSocket clients.
    pub broadcaster: EventBroadcaster,
}

impl AppState {
    /// Creates a new `AppState` that calls `gateway` for every model step.
    #[must_use]
    pub fn new(config: Config, gateway: Arc<dyn ModelGateway>) -> Self {
        Self {
            pipeline: Pipeline::new(Arc::clone(&gateway), &config),
            image_tool: ImageTool::new(gateway, &config),
            runs: RunRegistry::with_retention(config.max_retained_runs),
            config,
            broadcaster: EventBroadcaster::default(),
        }
    }

    /// Registers a run and starts it on its own task.
    ///
    /// Returns the run id immediately; progress is observable through the
    /// registry and the broadcaster.
    pub async fn start_run(&self, topic: Topic, mode: GenerationMode) -> String {
        let run_id = self.runs.next_run_id();
        let state = PipelineState::new(&run_id, topic, mode);
        let (reporter, receiver) = ProgressReporter::new(&state, self.broadcaster.clone());
        self.runs.insert(run_id.clone(), receiver).await;

        let pipeline = self.pipeline.clone();
        tokio::spawn(async move {
            let finished = pipeline.run(state, &reporter).await;
            info!(
                run_id = %finished.run_id,
                status = %finished.status,
                modules = finished.modules.len(),
                "Run task finished"
            );
        });

        run_id
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Internal error type for API handlers.
#[derive(Debug)]
enum ApiError {
    /// The request was malformed.
    BadRequest(String),
    /// The requested run or module does not exist.
    NotFound(String),
    /// The model gateway failed.
    Upstream(String),
}

impl From<ScholarError> for ApiError {
    fn from(err: ScholarError) -> Self {
        match err {
            ScholarError::EmptyTopic | ScholarError::EmptyPrompt => Self::BadRequest(err.to_string()),
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints and the WebSocket route.
///
/// Includes permissive CORS for local front ends and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/modules", post(handle_start_run))
        .route("/runs", get(handle_list_runs))
        .route("/runs/:id", get(handle_get_run))
        .route("/runs/:id/modules/:index/content", get(handle_module_content))
        .route("/images", post(handle_generate_image))
        .route("/health", get(handle_health));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `POST /api/modules`.
async fn handle_start_run(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRunRequest>,
) -> Result<(StatusCode, Json<StartRunResponse>), ApiError> {
    let topic = Topic::new(&request.topic)?;
    let mode = request.mode.unwrap_or(state.config.default_mode);

    let run_id = state.start_run(topic, mode).await;
    info!(run_id = %run_id, mode = %mode, "Run accepted");

    Ok((StatusCode::ACCEPTED, Json(StartRunResponse { run_id })))
}

/// Handler for `GET /api/runs`.
async fn handle_list_runs(State(state): State<Arc<AppState>>) -> Json<Vec<RunSummary>> {
    Json(state.runs.summaries().await)
}

/// Handler for `GET /api/runs/:id`.
async fn handle_get_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Result<Json<PipelineState>, ApiError> {
    state
        .runs
        .get(&run_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No run with id '{run_id}'")))
}

/// Handler for `GET /api/runs/:id/modules/:index/content`.
///
/// Serves the interactive document of a finished module as HTML.
async fn handle_module_content(
    State(state): State<Arc<AppState>>,
    Path((run_id, index)): Path<(String, usize)>,
) -> Result<Html<String>, ApiError> {
    let run = state
        .runs
        .get(&run_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("No run with id '{run_id}'")))?;

    run.modules
        .into_iter()
        .find(|m| m.index == index)
        .map(|m| Html(m.content.html_content))
        .ok_or_else(|| {
            ApiError::NotFound(format!("Run '{run_id}' has no completed module {index}"))
        })
}

/// Handler for `POST /api/images`.
async fn handle_generate_image(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ImageToolRequest>,
) -> Result<Json<ImageToolOutcome>, ApiError> {
    let outcome = state.image_tool.generate(request).await.map_err(|e| {
        warn!(error = %e, "Image tool failed");
        ApiError::from(e)
    })?;
    Ok(Json(outcome))
}

/// Handler for `GET /api/health`.
async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        active_runs: state.runs.active_count().await,
    })
}

// ============================================================================
// Tests
// ============================================================================

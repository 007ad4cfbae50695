//! HTTP JSON API over the [`Assistant`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/providers` | Configured provider chain |
//! | `POST` | `/patients/{id}/summarize` | Summarize the patient record |
//! | `POST` | `/patients/{id}/ask` | Answer `{"question": "..."}` about the record |
//!
//! Successful pipeline calls return `{"status": "ok", ...}`. A patient with
//! no usable notes or documents is not an error: the reply is
//! `{"status": "insufficient_data", "message": "..."}` with HTTP 200.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "patient not found: 42" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front ends
//! can call the API directly.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::PipelineError;
use crate::models::PatientId;
use crate::pipeline::{AssistReply, Assistant};
use crate::status::{get_providers, ProviderStatus};
use crate::store::sqlite::SqliteStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    assistant: Arc<Assistant>,
}

impl AppState {
    pub fn new(config: Arc<Config>, assistant: Arc<Assistant>) -> Self {
        Self { config, assistant }
    }
}

/// Starts the HTTP server on `[server].bind`, backed by the configured
/// SQLite database. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let store = Arc::new(SqliteStore::open(config).await?);
    let assistant = Arc::new(Assistant::from_config(store, config)?);
    let state = AppState::new(Arc::new(config.clone()), assistant);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("EMR assist listening on http://{}", bind_addr);
    tracing::info!(bind = %bind_addr, "server started");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Route table with CORS applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/providers", get(handle_providers))
        .route("/patients/{id}/summarize", post(handle_summarize))
        .route("/patients/{id}/ask", post(handle_ask))
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

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::PatientNotFound(_) => not_found(err.to_string()),
            PipelineError::EmptyContext(_) => bad_request(err.to_string()),
            PipelineError::Store(e) => {
                tracing::error!("store failure: {:#}", e);
                internal("failed to read patient record")
            }
        }
    }
}

fn parse_patient_id(raw: &str) -> Result<PatientId, AppError> {
    raw.parse()
        .map_err(|_| bad_request(format!("invalid patient id: {}", raw)))
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

// ============ GET /providers ============

#[derive(Serialize)]
struct ProvidersResponse {
    providers: Vec<ProviderStatus>,
}

async fn handle_providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        providers: get_providers(&state.config),
    })
}

// ============ POST /patients/{id}/summarize ============

async fn handle_summarize(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AssistReply>, AppError> {
    let patient_id = parse_patient_id(&id)?;
    let reply = state.assistant.reply(patient_id, None).await?;
    Ok(Json(reply))
}

// ============ POST /patients/{id}/ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AssistReply>, AppError> {
    let patient_id = parse_patient_id(&id)?;
    let Json(request) = body.map_err(|e| bad_request(e.body_text()))?;
    // A blank question falls through to summary mode.
    let reply = state
        .assistant
        .reply(patient_id, Some(&request.question))
        .await?;
    Ok(Json(reply))
}

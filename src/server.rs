//! HTTP server for the auction extraction API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/subasta/ExtraccionSubasta` | Run an extraction |
//! | `GET`  | `/api/subasta/Preview` | Placeholder, not implemented |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Response Contract
//!
//! Extraction responses are always a [`ResponseEnvelope`]:
//!
//! ```json
//! { "success": false, "data": null, "message": "auction extraction failed",
//!   "error": { "errorCode": 53006, "message": "invalid date range: from > to", "httpStatusCode": 400 } }
//! ```
//!
//! The HTTP status is 200 on success and `error.httpStatusCode` otherwise.
//! Bodies that do not deserialize (including a missing or blank employee id)
//! are answered with 400 and business code 400 before any store call.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::extraction::Extractor;
use crate::models::{ErrorResponse, ExtractionRequest, ExtractionResult, ResponseEnvelope};
use crate::store::mssql::MssqlStore;

/// Envelope message for requests rejected before reaching the store.
pub const INVALID_REQUEST_MESSAGE: &str = "invalid extraction request";

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    extractor: Arc<Extractor>,
}

/// Starts the HTTP server against the configured SQL Server store.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = MssqlStore::from_config(&config.db)?;
    let extractor = Arc::new(Extractor::new(Arc::new(store)));

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    serve(listener, extractor).await
}

/// Serves the API on an already-bound listener.
///
/// Used by [`run_server`] and by tests that bind an ephemeral port and
/// supply their own store.
pub async fn serve(listener: TcpListener, extractor: Arc<Extractor>) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "auction extraction server listening");

    axum::serve(listener, router(extractor))
        .await
        .context("Server error")?;
    Ok(())
}

/// Builds the API router.
pub fn router(extractor: Arc<Extractor>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/subasta/ExtraccionSubasta", post(handle_extraction))
        .route("/api/subasta/Preview", get(handle_preview))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { extractor })
}

// ============ Envelope response ============

/// An envelope paired with the HTTP status it must be sent with.
struct EnvelopeResponse(ResponseEnvelope<ExtractionResult>);

impl IntoResponse for EnvelopeResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0)).into_response()
    }
}

/// Constructs the 400 envelope for a request body that could not be read.
fn invalid_request(rejection: &JsonRejection) -> EnvelopeResponse {
    EnvelopeResponse(ResponseEnvelope::failure(
        ErrorResponse {
            error_code: 400,
            message: rejection.body_text(),
            http_status_code: 400,
        },
        INVALID_REQUEST_MESSAGE,
    ))
}

// ============ POST /api/subasta/ExtraccionSubasta ============

/// Handler for `POST /api/subasta/ExtraccionSubasta`.
///
/// Extracts auction items and moves them to the "in auction" status.
async fn handle_extraction(
    State(state): State<AppState>,
    payload: Result<Json<ExtractionRequest>, JsonRejection>,
) -> EnvelopeResponse {
    let Json(request) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "rejecting malformed extraction request");
            return invalid_request(&rejection);
        }
    };

    info!(employee_id = %request.employee_id, "received auction extraction request");
    let envelope = state.extractor.extract(&request).await;

    match &envelope.error {
        Some(err) => warn!(
            code = err.error_code,
            status = err.http_status_code,
            message = %err.message,
            "auction extraction returned an error"
        ),
        None => info!(
            total_extracted = envelope.data.as_ref().map(|d| d.total_extracted),
            "auction extraction request completed"
        ),
    }

    EnvelopeResponse(envelope)
}

// ============ GET /api/subasta/Preview ============

/// Optional filters accepted by the preview endpoint. Currently unused.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
struct PreviewQuery {
    #[serde(alias = "fechaDesde")]
    date_from: Option<String>,
    #[serde(alias = "fechaHasta")]
    date_to: Option<String>,
    #[serde(alias = "organismoId")]
    organization_id: Option<String>,
    #[serde(alias = "estBienId")]
    item_status_id: Option<String>,
}

/// JSON response body for `GET /api/subasta/Preview`.
#[derive(Serialize)]
struct PreviewResponse {
    message: String,
    suggestion: String,
}

/// Handler for `GET /api/subasta/Preview`.
///
/// Would count the items an extraction is going to take without changing
/// their status; no such query exists in the store yet.
async fn handle_preview(Query(query): Query<PreviewQuery>) -> Json<PreviewResponse> {
    debug!(?query, "extraction preview requested");
    Json(PreviewResponse {
        message: "extraction preview is not implemented".to_string(),
        suggestion: "use the extraction endpoint with a test employee".to_string(),
    })
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

/// Handler for `GET /health`.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

//! API handlers for the writ petition server
//!
//! Provides REST endpoints for:
//! - Template listing and schema lookup
//! - CSRF token issue
//! - Document generation and re-download

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use docx_engine::{
    ArtifactId, EngineError, GenerationRequest, Generator, TemplateDescriptor, DOCX_MIME_TYPE,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::csrf::{CsrfError, CsrfGuard, CSRF_HEADER};
use crate::error::ApiError;

/// Header naming the stored artifact in a generation response
pub const ARTIFACT_HEADER: &str = "x-artifact-id";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<Generator>,
    pub csrf: CsrfGuard,
    /// Off only in the testing environment
    pub csrf_enabled: bool,
    pub purge_after_download: bool,
}

/// Build the application router
pub fn router(state: AppState, max_content_length: usize) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handle_health))
        // API endpoints
        .route("/api/templates", get(handle_list_templates))
        .route("/api/templates/:key", get(handle_get_template))
        .route("/api/csrf-token", get(handle_csrf_token))
        .route("/api/generate", post(handle_generate))
        .route("/api/artifacts/:id", get(handle_download_artifact))
        // Apply middleware
        .layer(DefaultBodyLimit::max(max_content_length))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "writgen-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Template list response
#[derive(Serialize)]
pub struct TemplateListResponse {
    pub success: bool,
    pub templates: Vec<TemplateDescriptor>,
    pub count: usize,
}

/// Handler: GET /api/templates
///
/// Also starts a sweep of expired documents in the background.
pub async fn handle_list_templates(State(state): State<AppState>) -> Json<TemplateListResponse> {
    let generator = Arc::clone(&state.generator);
    let sweep = tokio::task::spawn_blocking(move || generator.sweep(Utc::now()));
    tokio::spawn(async move {
        match sweep.await {
            Ok(report) => debug!(
                "Opportunistic sweep: removed={}, retained={}, errors={}",
                report.removed, report.retained, report.errors
            ),
            Err(err) => warn!("Sweep task failed: {}", err),
        }
    });

    let templates: Vec<TemplateDescriptor> = state.generator.registry().list().cloned().collect();
    let count = templates.len();

    Json(TemplateListResponse {
        success: true,
        templates,
        count,
    })
}

/// Single template response
#[derive(Serialize)]
pub struct TemplateResponse {
    pub success: bool,
    pub template: TemplateDescriptor,
}

/// Handler: GET /api/templates/:key
pub async fn handle_get_template(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<TemplateResponse>, ApiError> {
    let template = state.generator.registry().lookup(&key)?.clone();
    Ok(Json(TemplateResponse {
        success: true,
        template,
    }))
}

/// CSRF token response
#[derive(Serialize)]
pub struct CsrfTokenResponse {
    pub success: bool,
    pub token: String,
    /// Header the token must be sent in
    pub header: &'static str,
}

/// Handler: GET /api/csrf-token
pub async fn handle_csrf_token(
    State(state): State<AppState>,
) -> Result<Json<CsrfTokenResponse>, ApiError> {
    let token = state
        .csrf
        .issue(Utc::now())
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok(Json(CsrfTokenResponse {
        success: true,
        token,
        header: "X-CSRF-Token",
    }))
}

fn check_csrf(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    if !state.csrf_enabled {
        return Ok(());
    }
    let token = headers
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(CsrfError::Missing)?;
    state.csrf.verify(token, Utc::now()).map_err(|err| {
        warn!("Rejected generation request: {}", err);
        ApiError::from(err)
    })
}

/// Handler: POST /api/generate
///
/// Returns the document itself; its id comes back in `X-Artifact-Id` for a
/// later re-download.
pub async fn handle_generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    check_csrf(&state, &headers)?;

    let Json(request) = payload.map_err(|rejection| {
        debug!("Unreadable generation request: {}", rejection.body_text());
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::InvalidRequest(rejection.body_text())
        }
    })?;

    info!(
        "Generate request: template={}, fields={}",
        request.template_key,
        request.fields.len()
    );

    let generator = Arc::clone(&state.generator);
    let artifact = tokio::task::spawn_blocking(move || generator.generate(&request, Utc::now()))
        .await
        .map_err(|err| ApiError::Internal(format!("generation task failed: {}", err)))??;

    Ok(document_response(&artifact.id, &artifact.download_name, artifact.content))
}

/// Handler: GET /api/artifacts/:id
pub async fn handle_download_artifact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id: ArtifactId = id.parse()?;

    let generator = Arc::clone(&state.generator);
    let purge = state.purge_after_download;
    let (record, content) = tokio::task::spawn_blocking(move || {
        let opened = generator.store().open(&id, Utc::now())?;
        if purge {
            if let Err(err) = generator.store().purge(&id) {
                warn!("Could not purge downloaded artifact {}: {}", id, err);
            }
        }
        Ok::<_, EngineError>(opened)
    })
    .await
    .map_err(|err| ApiError::Internal(format!("download task failed: {}", err)))??;

    debug!("Artifact {} downloaded", record.id);
    Ok(document_response(&record.id, &record.download_name, content))
}

fn document_response(id: &ArtifactId, download_name: &str, content: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, DOCX_MIME_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", download_name),
            ),
            (HeaderName::from_static(ARTIFACT_HEADER), id.to_string()),
        ],
        content,
    )
        .into_response()
}


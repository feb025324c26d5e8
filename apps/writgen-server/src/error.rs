//! Error types for the writ petition server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use docx_engine::{EngineError, ValidationError};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::csrf::CsrfError;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Validation failed")]
    Validation {
        errors: Vec<ValidationError>,
        accepted: Vec<String>,
    },

    #[error("CSRF check failed: {0}")]
    Csrf(#[from] CsrfError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Storage unavailable: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<ValidationError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    accepted: Option<Vec<String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::TemplateNotFound(key) => (
                StatusCode::NOT_FOUND,
                "TEMPLATE_NOT_FOUND",
                format!("Unknown document type '{}'", key),
            ),
            ApiError::ArtifactNotFound(_) => (
                StatusCode::NOT_FOUND,
                "ARTIFACT_NOT_FOUND",
                "Document not found or expired".to_string(),
            ),
            ApiError::Validation { errors, .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_FAILED",
                format!("{} field(s) need attention", errors.len()),
            ),
            ApiError::Csrf(err) => (StatusCode::FORBIDDEN, "CSRF_FAILED", err.to_string()),
            ApiError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg.clone())
            }
            ApiError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                "Request body exceeds the configured limit".to_string(),
            ),
            // Internal detail is logged, never returned
            ApiError::Generation(detail) => {
                error!("Document generation failed: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "GENERATION_FAILED",
                    "Error generating document. Please check your input and try again."
                        .to_string(),
                )
            }
            ApiError::Storage(detail) => {
                error!("Storage failure: {}", detail);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORAGE_UNAVAILABLE",
                    "Document storage is temporarily unavailable".to_string(),
                )
            }
            ApiError::Internal(detail) => {
                error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred. Please try again later.".to_string(),
                )
            }
        };

        let (errors, accepted) = match self {
            ApiError::Validation { errors, accepted } => (Some(errors), Some(accepted)),
            _ => (None, None),
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code,
            errors,
            accepted,
        };

        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(report) => ApiError::Validation {
                errors: report.errors,
                accepted: report.accepted,
            },
            EngineError::NotFound(key) => ApiError::TemplateNotFound(key),
            EngineError::ArtifactNotFound(id) => ApiError::ArtifactNotFound(id),
            EngineError::Storage(io) => ApiError::Storage(io.to_string()),
            EngineError::Generation(msg) => ApiError::Generation(msg),
            EngineError::Registry(msg) => ApiError::Internal(msg),
        }
    }
}

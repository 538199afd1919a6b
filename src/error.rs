//! Error types for the flipbook server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::offline::OfflineError;
use crate::render::{DocumentLoadError, PageRenderError};
use crate::storage::StorageError;
use crate::viewer::ViewerError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Document error: {0}")]
    Document(#[from] DocumentLoadError),

    #[error("Render error: {0}")]
    Render(#[from] PageRenderError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Offline cache error: {0}")]
    Offline(#[from] OfflineError),
}

impl From<ViewerError> for AppError {
    fn from(e: ViewerError) -> Self {
        match e {
            ViewerError::Load(e) => AppError::Document(e),
            ViewerError::Render(e) => AppError::Render(e),
            ViewerError::Storage(e) => AppError::Storage(e),
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Document(e) => match e {
                DocumentLoadError::MissingSource => {
                    (StatusCode::BAD_REQUEST, "missing_document", e.to_string())
                }
                DocumentLoadError::Unreadable(_) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "unreadable_document",
                    "The document could not be read".to_string(),
                ),
                DocumentLoadError::Superseded => {
                    (StatusCode::CONFLICT, "superseded", e.to_string())
                }
                DocumentLoadError::Task(_) => {
                    tracing::error!("Document task error: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal_error",
                        "An internal error occurred".to_string(),
                    )
                }
            },
            AppError::Render(e) => match e {
                PageRenderError::OutOfRange { .. } | PageRenderError::NoDocument => {
                    (StatusCode::NOT_FOUND, "not_found", e.to_string())
                }
                PageRenderError::Superseded | PageRenderError::Evicted(_) => {
                    (StatusCode::CONFLICT, "superseded", e.to_string())
                }
                _ => {
                    tracing::error!("Render error: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "render_error",
                        "Failed to render page".to_string(),
                    )
                }
            },
            AppError::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "Storage error".to_string(),
                )
            }
            AppError::Offline(e) => match e {
                OfflineError::Timeout { url } => (
                    StatusCode::GATEWAY_TIMEOUT,
                    "upstream_timeout",
                    format!("Upstream timed out: {}", url),
                ),
                OfflineError::NetworkUnavailable { url, .. } | OfflineError::Fetch { url, .. } => (
                    StatusCode::BAD_GATEWAY,
                    "upstream_unavailable",
                    format!("Upstream unavailable: {}", url),
                ),
                OfflineError::InvalidUrl(msg) => {
                    (StatusCode::BAD_REQUEST, "bad_request", msg.clone())
                }
                _ => {
                    tracing::error!("Offline cache error: {}", e);
                    (
                        StatusCode::BAD_GATEWAY,
                        "offline_cache_error",
                        "Offline cache error".to_string(),
                    )
                }
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = self.parts();

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}

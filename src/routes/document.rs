//! Current document endpoints
//!
//! - `GET /api/document`: viewer state
//! - `POST /api/document`: import a PDF (raw body, name in `x-file-name`)
//! - `DELETE /api/document`: forget the stored document

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Header carrying the original file name of an upload
pub const FILE_NAME_HEADER: &str = "x-file-name";

const DEFAULT_FILE_NAME: &str = "document.pdf";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub total_pages: u32,
    pub loading: bool,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_document).post(import_document).delete(forget_document))
        // Allow up to 200MB uploads for large documents
        .layer(DefaultBodyLimit::max(200 * 1024 * 1024))
}

fn describe(state: &AppState) -> DocumentResponse {
    let viewer = state.viewer();
    let current = viewer.state();
    DocumentResponse {
        total_pages: current.total_pages,
        loading: current.loading,
        error: current.error,
        name: viewer.document_name(),
    }
}

async fn get_document(State(state): State<AppState>) -> Json<DocumentResponse> {
    Json(describe(&state))
}

async fn import_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<DocumentResponse>)> {
    if body.is_empty() {
        return Err(AppError::BadRequest("Request body is empty".to_string()));
    }
    let name = headers
        .get(FILE_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_FILE_NAME)
        .to_string();

    state.viewer().import(body, &name).await?;
    Ok((StatusCode::CREATED, Json(describe(&state))))
}

async fn forget_document(State(state): State<AppState>) -> Result<StatusCode> {
    state.viewer().forget().await?;
    Ok(StatusCode::NO_CONTENT)
}

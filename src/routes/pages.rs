//! Rendered page endpoint
//!
//! `GET /api/pages/:n` focuses page `n` (so its neighbours are prefetched)
//! and returns the encoded image.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Router,
};

use crate::error::{AppError, Result};
use crate::render::PageRenderError;
use crate::state::AppState;

pub const PAGE_WIDTH_HEADER: &str = "x-page-width";
pub const PAGE_HEIGHT_HEADER: &str = "x-page-height";

pub fn router() -> Router<AppState> {
    Router::new().route("/:page", get(get_page))
}

async fn get_page(State(state): State<AppState>, Path(page): Path<u32>) -> Result<Response> {
    let viewer = state.viewer();
    let total_pages = viewer.state().total_pages;
    if total_pages == 0 {
        return Err(AppError::NotFound("No document open".to_string()));
    }
    if page == 0 || page > total_pages {
        return Err(AppError::NotFound(format!(
            "Page {} not found. Document has {} pages",
            page, total_pages
        )));
    }

    viewer.focus_page(page).await?;
    let rendered = viewer.render_page(page).await?;
    let image = viewer
        .pages()
        .images()
        .resolve(&rendered.image)
        .ok_or(AppError::Render(PageRenderError::Evicted(page)))?;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, image.format.mime_type())
        .header(header::CACHE_CONTROL, "no-store")
        .header(PAGE_WIDTH_HEADER, rendered.width)
        .header(PAGE_HEIGHT_HEADER, rendered.height)
        .body(Body::from(image.bytes))
        .expect("hardcoded headers cannot fail");

    Ok(response)
}

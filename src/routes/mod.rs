//! Route modules for the flipbook server

pub mod document;
pub mod health;
pub mod pages;
pub mod proxy;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/health", health::router())
        .nest("/api/document", document::router())
        .nest("/api/pages", pages::router())
        .fallback(proxy::forward)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

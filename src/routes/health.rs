//! Health check endpoints

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub service: &'static str,
    /// Bucket name of the active offline cache, if one is installed
    pub cache_version: Option<String>,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        service: "flipbook-server",
        cache_version: state
            .registration()
            .active()
            .map(|cache| cache.version().to_string()),
    })
}

pub fn router() -> axum::Router<AppState> {
    Router::new().route("/", get(health_check))
}

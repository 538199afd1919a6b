//! Intercepting proxy for the app shell
//!
//! Every request no other route claims is resolved against the upstream
//! origin and handed to the registration, which answers from the network or
//! from the offline cache. The response carries `x-flipbook-source` naming
//! where it came from.

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, StatusCode, Uri},
    response::Response,
};
use reqwest::Url;

use crate::error::{AppError, Result};
use crate::offline::{AssetRequest, AssetResponse, Method, RequestMode};
use crate::state::AppState;

pub const SOURCE_HEADER: &str = "x-flipbook-source";

/// Largest request body forwarded upstream
const MAX_FORWARD_BODY: usize = 16 * 1024 * 1024;

/// Response headers not copied back to the client
const SKIP_RESPONSE_HEADERS: &[&str] = &["connection", "content-length", "transfer-encoding"];

pub async fn forward(State(state): State<AppState>, request: Request) -> Result<Response> {
    let asset_request = to_asset_request(&state, request).await?;
    let fetched = state.registration().fetch(asset_request).await?;
    Ok(to_response(fetched.response, fetched.source.as_str()))
}

/// Navigation if the browser says so, or a GET that accepts HTML
fn request_mode(request: &Request) -> RequestMode {
    let headers = request.headers();
    if let Some(mode) = headers.get("sec-fetch-mode").and_then(|v| v.to_str().ok()) {
        return match mode {
            "navigate" => RequestMode::Navigate,
            "cors" => RequestMode::Cors,
            "no-cors" => RequestMode::NoCors,
            _ => RequestMode::SameOrigin,
        };
    }
    let accepts_html = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("text/html"))
        .unwrap_or(false);
    if request.method() == axum::http::Method::GET && accepts_html {
        RequestMode::Navigate
    } else {
        RequestMode::SameOrigin
    }
}

/// The upstream URL for a request target.
///
/// Only the path and query are taken from the request; scheme, host and port
/// always come from `upstream`. A target like `//other.host/x` stays a path
/// on the upstream origin.
pub fn upstream_url(upstream: &Url, uri: &Uri) -> Url {
    let mut url = upstream.clone();
    url.set_path(uri.path());
    url.set_query(uri.query());
    url.set_fragment(None);
    url
}

async fn to_asset_request(state: &AppState, request: Request) -> Result<AssetRequest> {
    let url = upstream_url(state.upstream(), request.uri());

    let mode = request_mode(&request);
    let method = Method::parse(request.method().as_str());
    let headers: Vec<(String, String)> = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let body = to_bytes(request.into_body(), MAX_FORWARD_BODY)
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read request body: {}", e)))?;

    Ok(AssetRequest {
        url,
        method,
        mode,
        headers,
        body: (!body.is_empty()).then_some(body),
    })
}

fn to_response(asset: AssetResponse, source: &'static str) -> Response {
    let mut response = Response::new(Body::from(asset.body));
    *response.status_mut() = StatusCode::from_u16(asset.status).unwrap_or(StatusCode::BAD_GATEWAY);

    let headers = response.headers_mut();
    for (name, value) in &asset.headers {
        if SKIP_RESPONSE_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    headers.insert(SOURCE_HEADER, HeaderValue::from_static(source));
    response
}

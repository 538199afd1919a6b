//! `NetworkFetcher` backed by reqwest

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use super::error::{OfflineError, Result};
use super::host::NetworkFetcher;
use super::types::{AssetRequest, AssetResponse, FetchOptions, ResponseType};

/// Request headers never forwarded upstream
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "host",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Fetches over HTTP, classifying responses against the app origin
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
    origin: Url,
}

impl ReqwestFetcher {
    /// `origin` decides whether a response is `Basic` (same origin) or `Cors`
    pub fn new(origin: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| OfflineError::fetch(&origin, e))?;
        Ok(Self { client, origin })
    }

    fn response_type_for(&self, url: &Url) -> ResponseType {
        if url.origin() == self.origin.origin() {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        }
    }
}

fn transport_error(url: &Url, error: reqwest::Error) -> OfflineError {
    if error.is_timeout() {
        OfflineError::Timeout {
            url: url.to_string(),
        }
    } else {
        OfflineError::fetch(url, error)
    }
}

#[async_trait]
impl NetworkFetcher for ReqwestFetcher {
    async fn fetch(&self, request: &AssetRequest, options: FetchOptions) -> Result<AssetResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| OfflineError::fetch(&request.url, e))?;

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            if HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h)) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if options.bypass_http_cache {
            builder = builder
                .header("cache-control", "no-cache")
                .header("pragma", "no-cache");
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(&request.url, e))?;

        let status = response.status().as_u16();
        let response_type = self.response_type_for(response.url());
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(&request.url, e))?;

        Ok(AssetResponse {
            status,
            response_type,
            headers,
            body,
        })
    }
}

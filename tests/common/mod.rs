//! Shared fakes for the integration tests
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Url;
use tokio::sync::{Notify, Semaphore};

use flipbook_offline::offline::{
    AssetRequest, AssetResponse, FetchOptions, NetworkFetcher, OfflineError, ResponseType,
};
use flipbook_offline::render::{
    DecodedDocument, DocumentLoadError, DocumentProvider, DocumentSource, PageRenderError, Raster,
    Viewport,
};

/// Bytes understood by `FakeProvider`: `fake:<name>:<pages>:<width>`
pub fn fake_pdf(name: &str, pages: u32, width: u32) -> Vec<u8> {
    format!("fake:{}:{}:{}", name, pages, width).into_bytes()
}

/// Per-document counters, shared between the provider and the document
#[derive(Default)]
pub struct DocStats {
    pub renders: AtomicUsize,
    pub destroyed: AtomicBool,
}

/// Decode provider parsing `fake_pdf` bytes, with optional gates
#[derive(Default)]
pub struct FakeProvider {
    stats: Mutex<HashMap<String, Arc<DocStats>>>,
    open_gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    render_gate: Mutex<Option<Arc<Semaphore>>>,
    failing: Arc<Mutex<HashSet<u32>>>,
    /// Signalled whenever an open call starts
    pub opened: Arc<Notify>,
    /// Signalled whenever a rasterize call starts
    pub rendering: Arc<Notify>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stats(&self, name: &str) -> Arc<DocStats> {
        self.stats.lock().entry(name.to_string()).or_default().clone()
    }

    pub fn renders(&self, name: &str) -> usize {
        self.stats(name).renders.load(Ordering::SeqCst)
    }

    /// Hold `open` for `name` until the returned semaphore gets a permit
    pub fn gate_open(&self, name: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.open_gates.lock().insert(name.to_string(), gate.clone());
        gate
    }

    /// Hold every rasterize call until the returned semaphore gets permits
    pub fn gate_renders(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.render_gate.lock() = Some(gate.clone());
        gate
    }

    /// Make rasterize fail for `page` in every document until healed
    pub fn fail_page(&self, page: u32) {
        self.failing.lock().insert(page);
    }

    pub fn heal_page(&self, page: u32) {
        self.failing.lock().remove(&page);
    }
}

fn parse(bytes: &[u8]) -> Option<(String, u32, u32)> {
    let text = std::str::from_utf8(bytes).ok()?;
    let mut parts = text.split(':');
    if parts.next()? != "fake" {
        return None;
    }
    let name = parts.next()?.to_string();
    let pages = parts.next()?.parse().ok()?;
    let width = parts.next()?.parse().ok()?;
    Some((name, pages, width))
}

#[async_trait]
impl DocumentProvider for FakeProvider {
    async fn open(&self, source: DocumentSource) -> Result<Arc<dyn DecodedDocument>, DocumentLoadError> {
        let DocumentSource::Bytes(bytes) = source else {
            return Err(DocumentLoadError::Unreadable("fake provider reads bytes only".into()));
        };
        let (name, pages, width) =
            parse(&bytes).ok_or_else(|| DocumentLoadError::Unreadable("not a fake pdf".into()))?;

        self.opened.notify_one();
        let gate = self.open_gates.lock().get(&name).cloned();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.map_err(|e| DocumentLoadError::Task(e.to_string()))?;
        }

        Ok(Arc::new(FakeDocument {
            pages,
            width: width as f32,
            stats: self.stats(&name),
            render_gate: self.render_gate.lock().clone(),
            rendering: self.rendering.clone(),
            failing: self.failing.clone(),
        }))
    }
}

pub struct FakeDocument {
    pages: u32,
    width: f32,
    stats: Arc<DocStats>,
    render_gate: Option<Arc<Semaphore>>,
    rendering: Arc<Notify>,
    failing: Arc<Mutex<HashSet<u32>>>,
}

#[async_trait]
impl DecodedDocument for FakeDocument {
    fn num_pages(&self) -> u32 {
        self.pages
    }

    async fn viewport(&self, page: u32, scale: f32) -> Result<Viewport, PageRenderError> {
        if self.stats.destroyed.load(Ordering::SeqCst) {
            return Err(PageRenderError::NoDocument);
        }
        if page == 0 || page > self.pages {
            return Err(PageRenderError::OutOfRange {
                page,
                total: self.pages,
            });
        }
        Ok(Viewport {
            width: self.width * scale,
            height: self.width * 1.5 * scale,
            scale,
        })
    }

    async fn rasterize(&self, page: u32, viewport: Viewport) -> Result<Raster, PageRenderError> {
        self.stats.renders.fetch_add(1, Ordering::SeqCst);
        self.rendering.notify_one();
        if let Some(gate) = &self.render_gate {
            let _permit = gate.acquire().await.map_err(|e| PageRenderError::Task(e.to_string()))?;
        }
        if self.failing.lock().contains(&page) {
            return Err(PageRenderError::raster(page, "injected raster fault"));
        }
        let (w, h) = viewport.pixel_size();
        Ok(Raster::filled(w, h, [240, 240, 240, 255]))
    }

    fn destroy(&self) {
        self.stats.destroyed.store(true, Ordering::SeqCst);
    }
}

/// Upstream with fixed responses and an offline switch
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, AssetResponse>>,
    offline: AtomicBool,
    unreachable: Mutex<HashSet<String>>,
    seen: Mutex<Vec<Url>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, response: AssetResponse) {
        self.responses.lock().insert(url.to_string(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Fail fetches of `url` at the transport level, as if the host dropped
    pub fn drop_connection(&self, url: &str) {
        self.unreachable.lock().insert(url.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every URL a fetch was attempted for, in order
    pub fn seen(&self) -> Vec<Url> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl NetworkFetcher for ScriptedFetcher {
    async fn fetch(&self, request: &AssetRequest, _options: FetchOptions) -> Result<AssetResponse, OfflineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(request.url.clone());
        if self.offline.load(Ordering::SeqCst) {
            return Err(OfflineError::fetch(&request.url, "network offline"));
        }
        let mut url = request.url.clone();
        url.set_fragment(None);
        if self.unreachable.lock().contains(url.as_str()) {
            return Err(OfflineError::fetch(&request.url, "connection reset"));
        }
        Ok(self
            .responses
            .lock()
            .get(url.as_str())
            .cloned()
            .unwrap_or_else(|| AssetResponse::new(404, ResponseType::Basic, "not found")))
    }
}

pub const ORIGIN: &str = "https://app.test/";

pub const SHELL_HTML: &str = r#"<!doctype html>
<html>
  <head>
    <link rel="manifest" href="manifest.webmanifest">
    <link rel="stylesheet" href="assets/index-3f2a.css">
    <script type="module" src="assets/index-9c1b.js"></script>
  </head>
  <body><div id="root"></div></body>
</html>"#;

pub const MANIFEST_JSON: &str = r#"{
  "name": "Flipbook",
  "icons": [
    { "src": "icons/icon-192.png", "sizes": "192x192" },
    { "src": "icons/icon-512.png", "sizes": "512x512" }
  ]
}"#;

pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).and_then(|base| base.join(path)).expect("valid test url")
}

/// A fetcher serving a small built app at `ORIGIN`
pub fn app_upstream() -> Arc<ScriptedFetcher> {
    let fetcher = ScriptedFetcher::new();
    let html = || AssetResponse::ok(SHELL_HTML).with_header("content-type", "text/html");
    fetcher.serve(ORIGIN, html());
    fetcher.serve(url("index.html").as_str(), html());
    fetcher.serve(
        url("manifest.webmanifest").as_str(),
        AssetResponse::ok(MANIFEST_JSON).with_header("content-type", "application/manifest+json"),
    );
    fetcher.serve(url("assets/index-3f2a.css").as_str(), AssetResponse::ok("body{margin:0}"));
    fetcher.serve(url("assets/index-9c1b.js").as_str(), AssetResponse::ok("console.log(1)"));
    fetcher.serve(url("icons/icon-192.png").as_str(), AssetResponse::ok(vec![0x89, b'P', 1]));
    fetcher.serve(url("icons/icon-512.png").as_str(), AssetResponse::ok(vec![0x89, b'P', 2]));
    fetcher
}

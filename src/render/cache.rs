//! Page render cache
//!
//! Turns page numbers into encoded images for the flipbook view:
//!
//! - results are memoized per page, bounded to `capacity` entries
//! - eviction keeps the pages nearest the focused page
//! - concurrent requests for one page share a single render
//! - a generation token discards work belonging to a replaced document
//!
//! # Locking
//!
//! `document`, `pages`, `in_flight` and `status` are `parking_lot` locks that
//! are never held across an `.await`. Where two are needed the order is
//! `in_flight` then `pages`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::task::JoinSet;

use super::error::{DocumentLoadError, PageRenderError};
use super::eviction::select_evictions;
use super::generation::{Generation, GenerationCounter};
use super::images::{encode_raster, ImageFormat, ImageHandle, ImageLease, ImageRegistry};
use super::provider::{DecodedDocument, DocumentProvider, DocumentSource};

/// Render cache configuration
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Maximum number of resident rendered pages
    pub capacity: usize,
    /// Display density reported by the client
    pub device_pixel_ratio: f32,
    /// Scale at a pixel ratio of 1
    pub base_scale: f32,
    /// Lower bound of the effective render scale
    pub min_scale: f32,
    /// Upper bound of the effective render scale
    pub max_scale: f32,
    /// Encoding for rendered pages
    pub format: ImageFormat,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            device_pixel_ratio: 1.0,
            base_scale: 1.5,
            min_scale: 1.0,
            max_scale: 3.0,
            format: ImageFormat::Jpeg,
            jpeg_quality: 85,
        }
    }
}

impl RenderConfig {
    /// `base_scale * device_pixel_ratio`, clamped to `[min_scale, max_scale]`
    pub fn render_scale(&self) -> f32 {
        let ratio = if self.device_pixel_ratio.is_finite() && self.device_pixel_ratio > 0.0 {
            self.device_pixel_ratio
        } else {
            1.0
        };
        let (low, high) = if self.min_scale <= self.max_scale {
            (self.min_scale, self.max_scale)
        } else {
            (self.max_scale, self.min_scale)
        };
        (self.base_scale * ratio).clamp(low, high)
    }
}

/// A rendered page as handed to the view layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedPage {
    pub page_number: u32,
    #[serde(serialize_with = "serialize_handle")]
    pub image: ImageHandle,
    pub width: u32,
    pub height: u32,
}

fn serialize_handle<S: serde::Serializer>(handle: &ImageHandle, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&handle.url())
}

/// What the view layer needs to draw its chrome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerState {
    pub total_pages: u32,
    pub loading: bool,
    pub error: Option<String>,
}

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderCacheStats {
    pub generation: u64,
    pub resident: usize,
    pub capacity: usize,
    pub in_flight: usize,
    pub renders_started: u64,
    pub live_images: usize,
}

struct CachedPage {
    page: RenderedPage,
    /// Dropping the lease revokes `page.image`
    _lease: ImageLease,
}

struct LoadedDocument {
    generation: u64,
    document: Arc<dyn DecodedDocument>,
    total_pages: u32,
}

#[derive(Default)]
struct Status {
    loading: bool,
    error: Option<String>,
}

type RenderFlight = Shared<BoxFuture<'static, Result<(), PageRenderError>>>;

struct Inner {
    config: RenderConfig,
    provider: Arc<dyn DocumentProvider>,
    images: ImageRegistry,
    generation: GenerationCounter,
    document: RwLock<Option<LoadedDocument>>,
    pages: Mutex<HashMap<u32, CachedPage>>,
    /// page -> (generation, shared render)
    in_flight: Mutex<HashMap<u32, (u64, RenderFlight)>>,
    /// 0 until a page is focused
    focus: AtomicU32,
    status: RwLock<Status>,
    renders_started: AtomicU64,
    prefetches: Mutex<JoinSet<()>>,
}

/// Per-session page render cache
#[derive(Clone)]
pub struct PageRenderCache {
    inner: Arc<Inner>,
}

impl PageRenderCache {
    pub fn new(provider: Arc<dyn DocumentProvider>, config: RenderConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                provider,
                images: ImageRegistry::new(),
                generation: GenerationCounter::new(),
                document: RwLock::new(None),
                pages: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                focus: AtomicU32::new(0),
                status: RwLock::new(Status::default()),
                renders_started: AtomicU64::new(0),
                prefetches: Mutex::new(JoinSet::new()),
            }),
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.inner.config
    }

    /// Registry resolving the handles in `RenderedPage::image`
    pub fn images(&self) -> &ImageRegistry {
        &self.inner.images
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.current()
    }

    pub fn total_pages(&self) -> u32 {
        self.inner
            .document
            .read()
            .as_ref()
            .map(|loaded| loaded.total_pages)
            .unwrap_or(0)
    }

    /// Most recently focused page, if any
    pub fn focused_page(&self) -> Option<u32> {
        match self.inner.focus.load(Ordering::Acquire) {
            0 => None,
            page => Some(page),
        }
    }

    pub fn state(&self) -> ViewerState {
        let status = self.inner.status.read();
        ViewerState {
            total_pages: self.total_pages(),
            loading: status.loading,
            error: status.error.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Document lifecycle
    // ------------------------------------------------------------------

    /// Open a document, replacing the current one.
    ///
    /// A load that finishes after a newer `open_document` or `teardown` is
    /// destroyed on arrival and reported as `Superseded`.
    pub async fn open_document(&self, source: DocumentSource) -> Result<u32, DocumentLoadError> {
        let token = self.inner.generation.advance();
        self.release_document();
        self.inner.focus.store(0, Ordering::Release);
        self.set_status(true, None);

        if source.is_empty() {
            let err = DocumentLoadError::MissingSource;
            self.finish_load(&token, Some(err.to_string()));
            return Err(err);
        }

        tracing::info!(generation = token.value(), "Opening document");
        let document = match self.inner.provider.open(source).await {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(generation = token.value(), error = %e, "Document load failed");
                self.finish_load(&token, Some(e.to_string()));
                return Err(e);
            }
        };

        let total_pages = document.num_pages();
        {
            let mut slot = self.inner.document.write();
            if !token.is_current() {
                drop(slot);
                tracing::debug!(generation = token.value(), "Discarding superseded document load");
                document.destroy();
                return Err(DocumentLoadError::Superseded);
            }
            *slot = Some(LoadedDocument {
                generation: token.value(),
                document,
                total_pages,
            });
        }

        self.finish_load(&token, None);
        tracing::info!(generation = token.value(), total_pages, "Document ready");
        Ok(total_pages)
    }

    /// Release the document and every image derived from it
    pub fn teardown(&self) {
        let token = self.inner.generation.advance();
        self.release_document();
        self.inner.focus.store(0, Ordering::Release);
        self.set_status(false, None);
        self.inner.prefetches.lock().abort_all();
        tracing::debug!(generation = token.value(), "Render cache torn down");
    }

    /// Destroy the loaded document, then revoke its pages and forget
    /// in-flight renders. Callers advance the generation first.
    fn release_document(&self) {
        let previous = self.inner.document.write().take();
        if let Some(previous) = &previous {
            previous.document.destroy();
        }

        let evicted: Vec<CachedPage> = {
            let mut pages = self.inner.pages.lock();
            pages.drain().map(|(_, cached)| cached).collect()
        };
        self.inner.in_flight.lock().clear();

        if let Some(previous) = previous {
            tracing::debug!(
                generation = previous.generation,
                released = evicted.len(),
                "Released document"
            );
        }
        drop(evicted);
    }

    fn set_status(&self, loading: bool, error: Option<String>) {
        let mut status = self.inner.status.write();
        status.loading = loading;
        status.error = error;
    }

    fn finish_load(&self, token: &Generation, error: Option<String>) {
        if token.is_current() {
            self.set_status(false, error);
        }
    }

    fn current_document(&self) -> Option<(Arc<dyn DecodedDocument>, u32, Generation)> {
        let slot = self.inner.document.read();
        let loaded = slot.as_ref()?;
        let token = self.inner.generation.token();
        if token.value() != loaded.generation {
            return None;
        }
        Some((Arc::clone(&loaded.document), loaded.total_pages, token))
    }

    // ------------------------------------------------------------------
    // Pages
    // ------------------------------------------------------------------

    /// Pure lookup
    pub fn get_page(&self, page: u32) -> Option<RenderedPage> {
        self.inner
            .pages
            .lock()
            .get(&page)
            .map(|cached| cached.page.clone())
    }

    /// Resident page numbers, ascending
    pub fn resident_pages(&self) -> Vec<u32> {
        let mut pages: Vec<u32> = self.inner.pages.lock().keys().copied().collect();
        pages.sort_unstable();
        pages
    }

    /// Make sure `page` is rendered and resident.
    ///
    /// Outside `[1, total_pages]`, or already cached: no-op. A render already
    /// in flight for the page is joined rather than duplicated; the render runs
    /// as its own task and finishes even if every caller goes away. Failures are
    /// only returned (and recorded in the viewer state) when `priority` is
    /// set; background requests leave the page unrendered for a later retry.
    pub async fn ensure_page_loaded(&self, page: u32, priority: bool) -> Result<(), PageRenderError> {
        let Some((document, total_pages, token)) = self.current_document() else {
            return Ok(());
        };
        if page == 0 || page > total_pages {
            return Ok(());
        }
        if self.inner.pages.lock().contains_key(&page) {
            return Ok(());
        }

        let flight = {
            let mut in_flight = self.inner.in_flight.lock();
            let joined = in_flight
                .get(&page)
                .filter(|(generation, _)| *generation == token.value())
                .map(|(_, flight)| flight.clone());
            match joined {
                Some(flight) => Some(flight),
                None if self.inner.pages.lock().contains_key(&page) => None,
                None => {
                    let job = tokio::spawn(self.clone().render_job(page, document, token.clone()));
                    let flight = job
                        .map(|joined| {
                            joined.unwrap_or_else(|e| Err(PageRenderError::Task(e.to_string())))
                        })
                        .boxed()
                        .shared();
                    in_flight.insert(page, (token.value(), flight.clone()));
                    Some(flight)
                }
            }
        };
        let Some(flight) = flight else {
            return Ok(());
        };

        match flight.await {
            Ok(()) => {
                if priority && token.is_current() {
                    self.inner.status.write().error = None;
                }
                Ok(())
            }
            Err(PageRenderError::Superseded) if !priority => Ok(()),
            Err(e) if priority => {
                tracing::warn!(page, error = %e, "Page render failed");
                if token.is_current() {
                    self.inner.status.write().error =
                        Some(format!("Failed to render page {}: {}", page, e));
                }
                Err(e)
            }
            Err(e) => {
                tracing::debug!(page, error = %e, "Prefetch failed, page left for retry");
                Ok(())
            }
        }
    }

    async fn render_job(
        self,
        page: u32,
        document: Arc<dyn DecodedDocument>,
        token: Generation,
    ) -> Result<(), PageRenderError> {
        let outcome = self.render_and_insert(page, document, &token).await;

        let mut in_flight = self.inner.in_flight.lock();
        if matches!(in_flight.get(&page), Some((generation, _)) if *generation == token.value()) {
            in_flight.remove(&page);
        }
        outcome
    }

    async fn render_and_insert(
        &self,
        page: u32,
        document: Arc<dyn DecodedDocument>,
        token: &Generation,
    ) -> Result<(), PageRenderError> {
        self.inner.renders_started.fetch_add(1, Ordering::Relaxed);
        let config = &self.inner.config;
        let scale = config.render_scale();
        tracing::debug!(page, scale, generation = token.value(), "Rendering page");

        let viewport = document.viewport(page, scale).await?;
        let raster = document.rasterize(page, viewport).await?;
        if !token.is_current() {
            return Err(PageRenderError::Superseded);
        }

        let (width, height) = (raster.width, raster.height);
        let format = config.format;
        let quality = config.jpeg_quality;
        let encoded = tokio::task::spawn_blocking(move || encode_raster(&raster, format, quality))
            .await
            .map_err(|e| PageRenderError::Task(format!("Task join error: {}", e)))??;

        let lease = self.inner.images.issue(encoded, format);
        let cached = CachedPage {
            page: RenderedPage {
                page_number: page,
                image: lease.handle().clone(),
                width,
                height,
            },
            _lease: lease,
        };

        let evicted = {
            let mut pages = self.inner.pages.lock();
            if !token.is_current() {
                drop(pages);
                drop(cached);
                return Err(PageRenderError::Superseded);
            }
            pages.insert(page, cached);
            self.evict_locked(&mut pages, page)
        };

        if !evicted.is_empty() {
            let numbers: Vec<u32> = evicted.iter().map(|c| c.page.page_number).collect();
            tracing::debug!(page, evicted = ?numbers, "Evicted pages");
        }
        Ok(())
    }

    /// Trim to capacity around the focused page (or `inserted` if nothing
    /// has been focused yet). Returned pages are dropped by the caller
    /// outside the lock, which revokes their images.
    fn evict_locked(&self, pages: &mut HashMap<u32, CachedPage>, inserted: u32) -> Vec<CachedPage> {
        let capacity = self.inner.config.capacity;
        if pages.len() <= capacity {
            return Vec::new();
        }
        let focus = self.focused_page().unwrap_or(inserted);
        select_evictions(pages.keys().copied(), focus, capacity)
            .into_iter()
            .filter_map(|number| pages.remove(&number))
            .collect()
    }

    /// Mark `page` as the page being viewed, render it with priority and
    /// prefetch its neighbours in the background.
    pub async fn focus_page(&self, page: u32) -> Result<(), PageRenderError> {
        let total_pages = self.total_pages();
        if page == 0 || page > total_pages {
            return Ok(());
        }
        self.inner.focus.store(page, Ordering::Release);

        let result = self.ensure_page_loaded(page, true).await;

        let neighbours = [page.checked_sub(1), page.checked_add(1)];
        let mut prefetches = self.inner.prefetches.lock();
        while prefetches.try_join_next().is_some() {}
        for neighbour in neighbours.into_iter().flatten() {
            if neighbour == 0 || neighbour > total_pages {
                continue;
            }
            let cache = self.clone();
            prefetches.spawn(async move {
                let _ = cache.ensure_page_loaded(neighbour, false).await;
            });
        }

        result
    }

    /// Render `page` for display and return it.
    ///
    /// The requested page becomes the focused page, so it is never the one
    /// evicted by its own insertion.
    pub async fn render_page(&self, page: u32) -> Result<RenderedPage, PageRenderError> {
        let total_pages = self.total_pages();
        if total_pages == 0 {
            return Err(PageRenderError::NoDocument);
        }
        if page == 0 || page > total_pages {
            return Err(PageRenderError::OutOfRange {
                page,
                total: total_pages,
            });
        }
        self.inner.focus.store(page, Ordering::Release);
        self.ensure_page_loaded(page, true).await?;
        self.get_page(page).ok_or(PageRenderError::Evicted(page))
    }

    /// Wait for background prefetches started by `focus_page`
    pub async fn settle(&self) {
        let mut prefetches = std::mem::take(&mut *self.inner.prefetches.lock());
        while prefetches.join_next().await.is_some() {}
    }

    pub fn stats(&self) -> RenderCacheStats {
        RenderCacheStats {
            generation: self.generation(),
            resident: self.inner.pages.lock().len(),
            capacity: self.inner.config.capacity,
            in_flight: self.inner.in_flight.lock().len(),
            renders_started: self.inner.renders_started.load(Ordering::Relaxed),
            live_images: self.inner.images.live_count(),
        }
    }
}

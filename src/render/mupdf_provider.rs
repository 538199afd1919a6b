//! MuPDF-backed decode provider
//!
//! MuPDF documents are not thread-safe and not `Send`. Each operation runs
//! on the blocking pool, opens a fresh `mupdf::Document` from the stored
//! source, and holds a per-document mutex for its duration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mupdf::{Colorspace, Document, Matrix};
use parking_lot::Mutex;

use super::error::{DocumentLoadError, PageRenderError};
use super::provider::{DecodedDocument, DocumentProvider, DocumentSource, Raster, Viewport};

const PDF_MIME: &str = "application/pdf";

/// Opens PDFs with MuPDF
#[derive(Debug, Clone, Copy, Default)]
pub struct MupdfProvider;

impl MupdfProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentProvider for MupdfProvider {
    async fn open(&self, source: DocumentSource) -> Result<Arc<dyn DecodedDocument>, DocumentLoadError> {
        if source.is_empty() {
            return Err(DocumentLoadError::MissingSource);
        }

        let document = tokio::task::spawn_blocking(move || DocumentState::open(source))
            .await
            .map_err(|e| DocumentLoadError::Task(format!("Task join error: {}", e)))??;

        tracing::debug!(pages = document.page_count, "Opened PDF with MuPDF");
        Ok(Arc::new(MupdfDocument {
            state: Arc::new(document),
        }))
    }
}

/// One opened PDF
pub struct MupdfDocument {
    state: Arc<DocumentState>,
}

struct DocumentState {
    source: DocumentSource,
    page_count: u32,
    destroyed: AtomicBool,
    /// Serializes access to MuPDF for this document
    lock: Mutex<()>,
}

// SAFETY: no MuPDF object is stored. `source` is owned immutable data and
// every MuPDF document is created, used and dropped inside `with_doc` while
// `lock` is held, so nothing non-Send escapes a single closure call.
unsafe impl Send for DocumentState {}
unsafe impl Sync for DocumentState {}

impl DocumentState {
    fn open(source: DocumentSource) -> Result<Self, DocumentLoadError> {
        let doc = open_mupdf(&source).map_err(|e| DocumentLoadError::Unreadable(e.to_string()))?;
        let page_count = doc
            .page_count()
            .map_err(|e| DocumentLoadError::Unreadable(e.to_string()))?;
        if page_count < 0 {
            return Err(DocumentLoadError::Unreadable("Negative page count".to_string()));
        }

        Ok(Self {
            source,
            page_count: page_count as u32,
            destroyed: AtomicBool::new(false),
            lock: Mutex::new(()),
        })
    }

    fn check_page(&self, page: u32) -> Result<(), PageRenderError> {
        if page == 0 || page > self.page_count {
            return Err(PageRenderError::OutOfRange {
                page,
                total: self.page_count,
            });
        }
        Ok(())
    }

    /// Run `f` against a freshly opened document
    fn with_doc<F, R>(&self, f: F) -> Result<R, PageRenderError>
    where
        F: FnOnce(&Document) -> Result<R, mupdf::Error>,
    {
        let _guard = self.lock.lock();
        if self.destroyed.load(Ordering::Acquire) {
            return Err(PageRenderError::NoDocument);
        }
        let doc = open_mupdf(&self.source).map_err(|e| PageRenderError::Task(e.to_string()))?;
        f(&doc).map_err(|e| PageRenderError::Task(e.to_string()))
    }
}

fn open_mupdf(source: &DocumentSource) -> Result<Document, mupdf::Error> {
    match source {
        DocumentSource::Bytes(data) => Document::from_bytes(data, PDF_MIME),
        DocumentSource::Path(path) => {
            let path_str = path.to_string_lossy();
            Document::open(&*path_str)
        }
    }
}

#[async_trait]
impl DecodedDocument for MupdfDocument {
    fn num_pages(&self) -> u32 {
        self.state.page_count
    }

    async fn viewport(&self, page: u32, scale: f32) -> Result<Viewport, PageRenderError> {
        self.state.check_page(page)?;
        let doc = Arc::clone(&self.state);

        tokio::task::spawn_blocking(move || {
            doc.with_doc(|mupdf_doc| {
                let bounds = mupdf_doc.load_page(page as i32 - 1)?.bounds()?;
                Ok(Viewport {
                    width: (bounds.x1 - bounds.x0) * scale,
                    height: (bounds.y1 - bounds.y0) * scale,
                    scale,
                })
            })
        })
        .await
        .map_err(|e| PageRenderError::Task(format!("Task join error: {}", e)))?
    }

    async fn rasterize(&self, page: u32, viewport: Viewport) -> Result<Raster, PageRenderError> {
        self.state.check_page(page)?;
        let doc = Arc::clone(&self.state);

        tokio::task::spawn_blocking(move || {
            doc.with_doc(|mupdf_doc| {
                let page_ref = mupdf_doc.load_page(page as i32 - 1)?;
                let matrix = Matrix::new_scale(viewport.scale, viewport.scale);
                let colorspace = Colorspace::device_rgb();
                let pixmap = page_ref.to_pixmap(&matrix, &colorspace, false, true)?;
                Ok(pixmap_to_raster(&pixmap))
            })
            .map_err(|e| match e {
                PageRenderError::Task(reason) => PageRenderError::raster(page, reason),
                other => other,
            })
        })
        .await
        .map_err(|e| PageRenderError::Task(format!("Task join error: {}", e)))?
    }

    fn destroy(&self) {
        let _guard = self.state.lock.lock();
        self.state.destroyed.store(true, Ordering::Release);
    }
}

/// Convert MuPDF samples (RGB or RGBA) to an RGBA raster
fn pixmap_to_raster(pixmap: &mupdf::Pixmap) -> Raster {
    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let samples = pixmap.samples();
    let n = pixmap.n() as usize;

    let mut rgba = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height as usize {
        for x in 0..width as usize {
            let offset = (y * width as usize + x) * n;
            let r = samples.get(offset).copied().unwrap_or(0);
            let g = samples.get(offset + 1).copied().unwrap_or(0);
            let b = samples.get(offset + 2).copied().unwrap_or(0);
            let a = if n >= 4 {
                samples.get(offset + 3).copied().unwrap_or(255)
            } else {
                255
            };
            rgba.extend_from_slice(&[r, g, b, a]);
        }
    }

    Raster {
        width,
        height,
        rgba,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_source_is_missing() {
        let provider = MupdfProvider::new();
        let result = provider.open(DocumentSource::from_bytes(Vec::new())).await;
        assert!(matches!(result, Err(DocumentLoadError::MissingSource)));
    }
}

//! Decode provider seam
//!
//! The page cache never parses PDF bytes itself. It opens documents through a
//! `DocumentProvider` and asks the resulting `DecodedDocument` for viewports
//! and rasters. Page numbers at this seam are 1-based.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::error::{DocumentLoadError, PageRenderError};

/// Source data for a document
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// Document loaded from owned bytes
    Bytes(Bytes),
    /// Document loaded from a file path
    Path(PathBuf),
}

impl DocumentSource {
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::Bytes(data.into())
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        Self::Path(path.as_ref().to_path_buf())
    }

    /// An empty byte buffer or an empty path
    pub fn is_empty(&self) -> bool {
        match self {
            DocumentSource::Bytes(data) => data.is_empty(),
            DocumentSource::Path(path) => path.as_os_str().is_empty(),
        }
    }
}

/// Page dimensions at a given scale, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub scale: f32,
}

impl Viewport {
    /// Rounded pixel size of a raster for this viewport
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            self.width.round().max(1.0) as u32,
            self.height.round().max(1.0) as u32,
        )
    }
}

/// Uncompressed RGBA raster of one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    /// `width * height * 4` bytes, row-major RGBA
    pub rgba: Vec<u8>,
}

impl Raster {
    /// A raster filled with a single colour
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = (width as usize) * (height as usize);
        let mut buffer = Vec::with_capacity(pixels * 4);
        for _ in 0..pixels {
            buffer.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            rgba: buffer,
        }
    }
}

/// Opens documents
#[async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, source: DocumentSource) -> Result<Arc<dyn DecodedDocument>, DocumentLoadError>;
}

/// An opened document instance holding native resources until destroyed
#[async_trait]
pub trait DecodedDocument: Send + Sync {
    fn num_pages(&self) -> u32;

    /// Page size scaled by `scale`
    async fn viewport(&self, page: u32, scale: f32) -> Result<Viewport, PageRenderError>;

    /// Rasterize a page at the given viewport
    async fn rasterize(&self, page: u32, viewport: Viewport) -> Result<Raster, PageRenderError>;

    /// Release native resources; later calls fail with `NoDocument`
    fn destroy(&self);
}

//! Page render cache
//!
//! Bounded cache of rendered PDF pages for a flipbook view. Documents are
//! decoded through the `DocumentProvider` seam (`MupdfProvider` in
//! production), rendered pages are encoded to images and handed out as
//! revocable `ImageHandle`s.

mod cache;
mod error;
mod eviction;
mod generation;
mod images;
mod mupdf_provider;
mod provider;

pub use cache::{PageRenderCache, RenderCacheStats, RenderConfig, RenderedPage, ViewerState};
pub use error::{DocumentLoadError, PageRenderError};
pub use eviction::select_evictions;
pub use generation::{Generation, GenerationCounter};
pub use images::{encode_raster, ImageFormat, ImageHandle, ImageLease, ImageRegistry, StoredImage};
pub use mupdf_provider::{MupdfDocument, MupdfProvider};
pub use provider::{DecodedDocument, DocumentProvider, DocumentSource, Raster, Viewport};

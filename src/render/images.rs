//! Encoded page images and their revocable handles
//!
//! An `ImageHandle` is what the view layer sees: an opaque, cloneable
//! reference (rendered as a `blob:` style URL) that resolves through the
//! `ImageRegistry`. The bytes behind it live exactly as long as the matching
//! `ImageLease`, which only the page cache holds. Dropping a lease revokes
//! the handle; there is no other way to free an image.

use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::error::PageRenderError;
use super::provider::Raster;

/// Encoded image format for rendered pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Jpeg,
    Png,
    Webp,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Webp => "image/webp",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            "webp" => Ok(ImageFormat::Webp),
            other => Err(format!("Unknown image format: {}", other)),
        }
    }
}

/// Encode a raster into a compressed image
pub fn encode_raster(
    raster: &Raster,
    format: ImageFormat,
    jpeg_quality: u8,
) -> Result<Vec<u8>, PageRenderError> {
    let img = image::RgbaImage::from_raw(raster.width, raster.height, raster.rgba.clone())
        .ok_or_else(|| PageRenderError::Encode("Raster buffer does not match its size".to_string()))?;
    let dynamic_img = DynamicImage::ImageRgba8(img);

    let mut output = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgb8(dynamic_img.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut output, jpeg_quality.clamp(1, 100));
            rgb.write_with_encoder(encoder)
                .map_err(|e| PageRenderError::Encode(e.to_string()))?;
        }
        ImageFormat::Png => {
            dynamic_img
                .write_to(&mut Cursor::new(&mut output), image::ImageFormat::Png)
                .map_err(|e| PageRenderError::Encode(e.to_string()))?;
        }
        ImageFormat::Webp => {
            dynamic_img
                .write_to(&mut Cursor::new(&mut output), image::ImageFormat::WebP)
                .map_err(|e| PageRenderError::Encode(e.to_string()))?;
        }
    }

    Ok(output)
}

/// Read-only reference to an encoded image
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageHandle {
    id: u64,
}

impl ImageHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Object-URL style identifier
    pub fn url(&self) -> String {
        format!("blob:flipbook/{}", self.id)
    }
}

impl fmt::Display for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blob:flipbook/{}", self.id)
    }
}

/// Bytes behind a live handle
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub bytes: Bytes,
    pub format: ImageFormat,
}

#[derive(Default)]
struct RegistryInner {
    next_id: AtomicU64,
    images: RwLock<HashMap<u64, StoredImage>>,
}

/// Issues and resolves image handles
#[derive(Clone, Default)]
pub struct ImageRegistry {
    inner: Arc<RegistryInner>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register encoded bytes; the returned lease owns them
    pub fn issue(&self, bytes: impl Into<Bytes>, format: ImageFormat) -> ImageLease {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.images.write().insert(
            id,
            StoredImage {
                bytes: bytes.into(),
                format,
            },
        );
        ImageLease {
            handle: ImageHandle { id },
            registry: Arc::clone(&self.inner),
        }
    }

    /// Bytes for a handle, or `None` once revoked
    pub fn resolve(&self, handle: &ImageHandle) -> Option<StoredImage> {
        self.inner.images.read().get(&handle.id).cloned()
    }

    /// Number of images not yet revoked
    pub fn live_count(&self) -> usize {
        self.inner.images.read().len()
    }
}

/// Exclusive owner of one registered image; revokes it on drop
pub struct ImageLease {
    handle: ImageHandle,
    registry: Arc<RegistryInner>,
}

impl ImageLease {
    pub fn handle(&self) -> &ImageHandle {
        &self.handle
    }

    /// Revoke now; equivalent to dropping the lease
    pub fn release(self) {}
}

impl Drop for ImageLease {
    fn drop(&mut self) {
        self.registry.images.write().remove(&self.handle.id);
    }
}

impl fmt::Debug for ImageLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageLease").field("handle", &self.handle).finish()
    }
}

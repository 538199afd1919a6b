//! Page render cache error types

use thiserror::Error;

/// Failure to open a document; fatal to the viewing session
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DocumentLoadError {
    /// No bytes (or an empty byte source) were supplied
    #[error("No document source provided")]
    MissingSource,

    /// The decode provider could not read the source
    #[error("Document could not be read: {0}")]
    Unreadable(String),

    /// A newer open (or a teardown) happened while this one was loading
    #[error("Document load superseded by a newer request")]
    Superseded,

    /// The blocking decode task panicked or was cancelled
    #[error("Document load task failed: {0}")]
    Task(String),
}

/// Per-page failure; shared between collapsed requests, hence `Clone`
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PageRenderError {
    /// Page number outside `[1, total_pages]`
    #[error("Page {page} out of range (1..={total})")]
    OutOfRange { page: u32, total: u32 },

    /// No document is open
    #[error("No document open")]
    NoDocument,

    /// The decode provider failed to rasterize the page
    #[error("Failed to rasterize page {page}: {reason}")]
    Raster { page: u32, reason: String },

    /// The raster could not be encoded
    #[error("Image encoding failed: {0}")]
    Encode(String),

    /// The document was replaced while the page was rendering
    #[error("Render superseded by a newer document")]
    Superseded,

    /// The page was evicted before it could be handed out
    #[error("Page {0} was evicted before it could be returned")]
    Evicted(u32),

    /// A blocking task panicked or was cancelled
    #[error("Render task failed: {0}")]
    Task(String),
}

impl PageRenderError {
    pub fn raster(page: u32, reason: impl ToString) -> Self {
        PageRenderError::Raster {
            page,
            reason: reason.to_string(),
        }
    }
}

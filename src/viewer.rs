//! Viewer shell
//!
//! Ties the persisted document slot to the page render cache: an import is
//! saved before it is opened, and the saved document is reopened on startup.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use thiserror::Error;

use crate::render::{
    DocumentLoadError, DocumentSource, PageRenderCache, PageRenderError, RenderedPage, ViewerState,
};
use crate::storage::{BlobStore, StorageError};

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("Document load failed: {0}")]
    Load(#[from] DocumentLoadError),

    #[error("Page render failed: {0}")]
    Render(#[from] PageRenderError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub struct Viewer {
    store: Arc<dyn BlobStore>,
    pages: PageRenderCache,
    /// Name of the open document, if any
    name: RwLock<Option<String>>,
}

impl Viewer {
    pub fn new(store: Arc<dyn BlobStore>, pages: PageRenderCache) -> Self {
        Self {
            store,
            pages,
            name: RwLock::new(None),
        }
    }

    pub fn pages(&self) -> &PageRenderCache {
        &self.pages
    }

    pub fn document_name(&self) -> Option<String> {
        self.name.read().clone()
    }

    /// Persist `bytes` as the current document, then open it
    pub async fn import(&self, bytes: Bytes, name: &str) -> Result<u32, ViewerError> {
        if bytes.is_empty() {
            return Err(DocumentLoadError::MissingSource.into());
        }
        let stored = self.store.save(bytes, name).await?;
        tracing::info!(name = %stored.original_name, size = stored.size, "Imported document");
        self.open(stored.bytes, stored.original_name).await
    }

    /// Reopen the persisted document, if there is one
    pub async fn restore(&self) -> Result<Option<u32>, ViewerError> {
        let stored = match self.store.load().await {
            Ok(Some(stored)) => stored,
            Ok(None) => return Ok(None),
            Err(StorageError::Corrupt(reason)) => {
                tracing::warn!(reason = %reason, "Discarding corrupt stored document");
                self.store.delete().await?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(name = %stored.original_name, "Restoring stored document");
        self.open(stored.bytes, stored.original_name).await.map(Some)
    }

    /// Delete the stored document and release everything rendered from it
    pub async fn forget(&self) -> Result<(), ViewerError> {
        self.store.delete().await?;
        self.pages.teardown();
        self.name.write().take();
        tracing::info!("Forgot stored document");
        Ok(())
    }

    pub fn state(&self) -> ViewerState {
        self.pages.state()
    }

    pub async fn render_page(&self, page: u32) -> Result<RenderedPage, ViewerError> {
        Ok(self.pages.render_page(page).await?)
    }

    pub async fn focus_page(&self, page: u32) -> Result<(), ViewerError> {
        Ok(self.pages.focus_page(page).await?)
    }

    async fn open(&self, bytes: Bytes, name: String) -> Result<u32, ViewerError> {
        self.name.write().take();
        let total_pages = self.pages.open_document(DocumentSource::Bytes(bytes)).await?;
        *self.name.write() = Some(name);
        Ok(total_pages)
    }
}

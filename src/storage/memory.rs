use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use super::types::{DocumentMetadata, Result, StoredDocument};
use super::BlobStore;

/// In-process blob store
#[derive(Default)]
pub struct MemoryBlobStore {
    slot: RwLock<Option<StoredDocument>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn save(&self, bytes: Bytes, original_name: &str) -> Result<StoredDocument> {
        let stored = StoredDocument::new(bytes.clone(), DocumentMetadata::describe(&bytes, original_name));
        *self.slot.write() = Some(stored.clone());
        Ok(stored)
    }

    async fn load(&self) -> Result<Option<StoredDocument>> {
        Ok(self.slot.read().clone())
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.slot.read().is_some())
    }

    async fn delete(&self) -> Result<()> {
        self.slot.write().take();
        Ok(())
    }
}

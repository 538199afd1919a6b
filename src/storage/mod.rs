//! Persisted document slot
//!
//! The viewer keeps exactly one imported PDF across restarts. `BlobStore`
//! abstracts where it lives; `FsBlobStore` writes it next to the server,
//! `MemoryBlobStore` backs tests and ephemeral runs.

mod fs;
mod memory;
mod types;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;
pub use types::*;

use async_trait::async_trait;
use bytes::Bytes;

/// Single-slot document persistence
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Replace the stored document
    async fn save(&self, bytes: Bytes, original_name: &str) -> Result<StoredDocument>;

    /// The stored document, if any
    async fn load(&self) -> Result<Option<StoredDocument>>;

    async fn exists(&self) -> Result<bool>;

    /// Remove the stored document; a no-op when the slot is empty
    async fn delete(&self) -> Result<()>;
}

//! Filesystem blob store
//!
//! Layout under the root directory:
//!
//! ```text
//! current-pdf.bin    document bytes
//! current-pdf.json   DocumentMetadata
//! ```
//!
//! Both files are replaced via temp file + rename, metadata last. A crash
//! between the two renames leaves a checksum mismatch, reported as
//! `StorageError::Corrupt` on the next load.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use super::types::{DocumentMetadata, Result, StorageError, StoredDocument, CURRENT_DOCUMENT_KEY};
use super::BlobStore;

pub struct FsBlobStore {
    root: PathBuf,
    /// Serializes save/delete
    write_lock: Mutex<()>,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bytes_path(&self) -> PathBuf {
        self.root.join(format!("{}.bin", CURRENT_DOCUMENT_KEY))
    }

    fn metadata_path(&self) -> PathBuf {
        self.root.join(format!("{}.json", CURRENT_DOCUMENT_KEY))
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn save(&self, bytes: Bytes, original_name: &str) -> Result<StoredDocument> {
        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.root).await?;

        let metadata = DocumentMetadata::describe(&bytes, original_name);
        write_atomic(&self.bytes_path(), &bytes).await?;
        write_atomic(&self.metadata_path(), &serde_json::to_vec_pretty(&metadata)?).await?;

        tracing::debug!(
            name = %metadata.original_name,
            size = metadata.size,
            root = %self.root.display(),
            "Saved document"
        );
        Ok(StoredDocument::new(bytes, metadata))
    }

    async fn load(&self) -> Result<Option<StoredDocument>> {
        let metadata: DocumentMetadata = match tokio::fs::read(self.metadata_path()).await {
            Ok(data) => serde_json::from_slice(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let bytes = match tokio::fs::read(self.bytes_path()).await {
            Ok(data) => Bytes::from(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::Corrupt("document bytes missing".to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        metadata.verify(&bytes)?;

        Ok(Some(StoredDocument::new(bytes, metadata)))
    }

    async fn exists(&self) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.metadata_path()).await?)
    }

    async fn delete(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        remove_if_present(&self.metadata_path()).await?;
        remove_if_present(&self.bytes_path()).await?;
        Ok(())
    }
}

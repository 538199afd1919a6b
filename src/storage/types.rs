//! Storage types

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Key of the only slot
pub const CURRENT_DOCUMENT_KEY: &str = "current-pdf";

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    /// The stored bytes do not match their metadata
    #[error("Stored document is corrupt: {0}")]
    Corrupt(String),
}

/// Metadata persisted alongside the document bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub original_name: String,
    pub size: u64,
    /// Hex SHA-256 of the bytes
    pub checksum: String,
    pub saved_at: DateTime<Utc>,
}

impl DocumentMetadata {
    pub fn describe(bytes: &[u8], original_name: &str) -> Self {
        Self {
            original_name: original_name.to_string(),
            size: bytes.len() as u64,
            checksum: checksum(bytes),
            saved_at: Utc::now(),
        }
    }

    /// Check `bytes` against the recorded size and checksum
    pub fn verify(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() as u64 != self.size {
            return Err(StorageError::Corrupt(format!(
                "expected {} bytes, found {}",
                self.size,
                bytes.len()
            )));
        }
        if checksum(bytes) != self.checksum {
            return Err(StorageError::Corrupt("checksum mismatch".to_string()));
        }
        Ok(())
    }
}

/// A persisted document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub bytes: Bytes,
    pub original_name: String,
    pub size: u64,
    pub saved_at: DateTime<Utc>,
}

impl StoredDocument {
    pub fn new(bytes: Bytes, metadata: DocumentMetadata) -> Self {
        Self {
            bytes,
            original_name: metadata.original_name,
            size: metadata.size,
            saved_at: metadata.saved_at,
        }
    }
}

fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

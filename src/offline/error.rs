//! Offline cache error types

use thiserror::Error;

/// Errors raised by the offline cache and its host adapters
#[derive(Debug, Error)]
pub enum OfflineError {
    /// Navigation failed and no cached shell exists
    #[error("Network unavailable for {url}: {reason}")]
    NetworkUnavailable { url: String, reason: String },

    /// A single network fetch failed
    #[error("Fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// A network fetch ran out of time
    #[error("Fetch timed out for {url}")]
    Timeout { url: String },

    /// Writing an entry to a bucket failed
    #[error("Cache write failed for {key}: {reason}")]
    CacheWrite { key: String, reason: String },

    /// Opening, listing or deleting buckets failed
    #[error("Cache storage error: {0}")]
    CacheStorage(String),

    /// A lifecycle transition was requested out of order
    #[error("Invalid lifecycle transition: {0}")]
    Lifecycle(String),

    /// A URL could not be parsed or resolved against the scope
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// IO error from a persistent adapter
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry metadata could not be (de)serialized
    #[error("Cache index error: {0}")]
    Index(#[from] serde_json::Error),
}

impl OfflineError {
    pub fn fetch(url: impl ToString, reason: impl ToString) -> Self {
        OfflineError::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn cache_write(key: impl Into<String>, reason: impl ToString) -> Self {
        OfflineError::CacheWrite {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for offline cache operations
pub type Result<T> = std::result::Result<T, OfflineError>;

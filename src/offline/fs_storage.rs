//! Filesystem-backed cache storage
//!
//! Layout:
//!
//! ```text
//! <root>/<bucket>/index.json         key -> entry metadata
//! <root>/<bucket>/<sha256(key)>.bin  response body
//! ```
//!
//! Bodies are written before the index, and both go through a temp file and
//! a rename, so a reader never sees an index entry without its body.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use super::error::{OfflineError, Result};
use super::host::{lookup, CacheBucket, CacheStorage};
use super::types::{cache_key, AssetResponse, MatchOptions, ResponseType};

const INDEX_FILE: &str = "index.json";

/// Metadata persisted per cached entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryMeta {
    status: u16,
    response_type: ResponseType,
    headers: Vec<(String, String)>,
    body_file: String,
}

fn body_file_name(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("{}.bin", hex::encode(digest))
}

fn validate_bucket_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(OfflineError::CacheStorage(format!(
            "Invalid bucket name: {}",
            name
        )))
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// A bucket stored in its own directory
pub struct FsBucket {
    name: String,
    dir: PathBuf,
    index: RwLock<BTreeMap<String, EntryMeta>>,
    /// Serializes index rewrites
    write_lock: Mutex<()>,
}

impl FsBucket {
    async fn open(dir: PathBuf, name: &str) -> Result<Self> {
        tokio::fs::create_dir_all(&dir).await?;

        let index_path = dir.join(INDEX_FILE);
        let index = match tokio::fs::read(&index_path).await {
            Ok(data) => serde_json::from_slice(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            name: name.to_string(),
            dir,
            index: RwLock::new(index),
            write_lock: Mutex::new(()),
        })
    }
}

#[async_trait]
impl CacheBucket for FsBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_url(&self, url: &Url, options: MatchOptions) -> Result<Option<AssetResponse>> {
        let meta = {
            let index = self.index.read();
            lookup(&index, url, options).cloned()
        };
        let Some(meta) = meta else {
            return Ok(None);
        };

        let body = match tokio::fs::read(self.dir.join(&meta.body_file)).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(bucket = %self.name, url = %url, "Cached body missing, treating as miss");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Some(AssetResponse {
            status: meta.status,
            response_type: meta.response_type,
            headers: meta.headers,
            body: Bytes::from(body),
        }))
    }

    async fn put(&self, url: &Url, response: &AssetResponse) -> Result<()> {
        let key = cache_key(url);
        let body_file = body_file_name(&key);
        let _guard = self.write_lock.lock().await;

        write_atomic(&self.dir.join(&body_file), &response.body)
            .await
            .map_err(|e| OfflineError::cache_write(key.clone(), e))?;

        let serialized = {
            let mut index = self.index.write();
            index.insert(
                key.clone(),
                EntryMeta {
                    status: response.status,
                    response_type: response.response_type,
                    headers: response.headers.clone(),
                    body_file,
                },
            );
            serde_json::to_vec_pretty(&*index)?
        };

        write_atomic(&self.dir.join(INDEX_FILE), &serialized)
            .await
            .map_err(|e| OfflineError::cache_write(key, e))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.index.read().keys().cloned().collect())
    }
}

/// Bucket set rooted at a directory
#[derive(Clone)]
pub struct FsCacheStorage {
    root: PathBuf,
}

impl FsCacheStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl CacheStorage for FsCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheBucket>> {
        validate_bucket_name(name)?;
        let bucket = FsBucket::open(self.root.join(name), name).await?;
        Ok(Arc::new(bucket))
    }

    async fn bucket_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        validate_bucket_name(name)?;
        match tokio::fs::remove_dir_all(self.root.join(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_fs_bucket_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsCacheStorage::new(dir.path());

        let bucket = storage.open("flipbook-v1").await.unwrap();
        let response = AssetResponse::ok(vec![0u8, 1, 2, 255]).with_header("content-type", "image/png");
        bucket
            .put(&url("https://a.test/icons/icon-192.png"), &response)
            .await
            .unwrap();
        drop(bucket);

        let reopened = storage.open("flipbook-v1").await.unwrap();
        let cached = reopened
            .match_url(&url("https://a.test/icons/icon-192.png"), MatchOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached, response);
    }

    #[tokio::test]
    async fn test_fs_bucket_replaces_entries() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsCacheStorage::new(dir.path());
        let bucket = storage.open("v1").await.unwrap();
        let target = url("https://a.test/app.css");

        bucket.put(&target, &AssetResponse::ok("old")).await.unwrap();
        bucket.put(&target, &AssetResponse::ok("new")).await.unwrap();

        let cached = bucket
            .match_url(&target, MatchOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.text(), "new");
        assert_eq!(bucket.keys().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fs_storage_lists_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsCacheStorage::new(dir.path().join("cache"));

        assert!(storage.bucket_names().await.unwrap().is_empty());
        storage.open("v1").await.unwrap();
        storage.open("v2").await.unwrap();
        assert_eq!(storage.bucket_names().await.unwrap(), vec!["v1", "v2"]);

        assert!(storage.delete("v1").await.unwrap());
        assert!(!storage.delete("v1").await.unwrap());
        assert_eq!(storage.bucket_names().await.unwrap(), vec!["v2"]);
    }

    #[tokio::test]
    async fn test_fs_storage_rejects_path_names() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsCacheStorage::new(dir.path());
        assert!(storage.open("../escape").await.is_err());
        assert!(storage.open("").await.is_err());
    }
}

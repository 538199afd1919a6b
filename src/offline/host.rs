//! Host adapter seams for the offline cache
//!
//! The lifecycle logic never touches the network or persistent storage
//! directly; it goes through these traits so it can run under a real HTTP
//! client and disk, or entirely in memory.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Url;

use super::error::Result;
use super::types::{
    cache_key, cache_key_without_search, AssetRequest, AssetResponse, FetchOptions, MatchOptions,
};

/// Network access for the offline cache
#[async_trait]
pub trait NetworkFetcher: Send + Sync {
    /// Perform a request. Transport failures are `Err`; HTTP error statuses
    /// are ordinary responses.
    async fn fetch(&self, request: &AssetRequest, options: FetchOptions) -> Result<AssetResponse>;
}

/// One named, versioned bucket of cached responses
#[async_trait]
pub trait CacheBucket: Send + Sync {
    fn name(&self) -> &str;

    /// Look up a response for `url`
    async fn match_url(&self, url: &Url, options: MatchOptions) -> Result<Option<AssetResponse>>;

    /// Store (or wholesale replace) the response for `url`
    async fn put(&self, url: &Url, response: &AssetResponse) -> Result<()>;

    /// All stored keys
    async fn keys(&self) -> Result<Vec<String>>;
}

/// The set of buckets
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a bucket, creating it when missing
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheBucket>>;

    /// Names of every existing bucket
    async fn bucket_names(&self) -> Result<Vec<String>>;

    /// Delete a bucket; returns whether it existed
    async fn delete(&self, name: &str) -> Result<bool>;
}

/// Pick the stored entry for `url` out of a key/value map
pub(crate) fn lookup<'a, V>(
    entries: &'a BTreeMap<String, V>,
    url: &Url,
    options: MatchOptions,
) -> Option<&'a V> {
    if let Some(entry) = entries.get(&cache_key(url)) {
        return Some(entry);
    }
    if !options.ignore_search {
        return None;
    }
    let wanted = cache_key_without_search(url);
    entries.iter().find_map(|(key, entry)| {
        let stored = Url::parse(key).ok()?;
        (cache_key_without_search(&stored) == wanted).then_some(entry)
    })
}

/// In-memory bucket
pub struct MemoryBucket {
    name: String,
    entries: RwLock<BTreeMap<String, AssetResponse>>,
}

impl MemoryBucket {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl CacheBucket for MemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_url(&self, url: &Url, options: MatchOptions) -> Result<Option<AssetResponse>> {
        let entries = self.entries.read();
        Ok(lookup(&entries, url, options).cloned())
    }

    async fn put(&self, url: &Url, response: &AssetResponse) -> Result<()> {
        self.entries.write().insert(cache_key(url), response.clone());
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

/// In-memory bucket set, shared between clones
#[derive(Clone, Default)]
pub struct MemoryCacheStorage {
    buckets: Arc<RwLock<HashMap<String, Arc<MemoryBucket>>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct handle on a bucket, if it exists
    pub fn bucket(&self, name: &str) -> Option<Arc<MemoryBucket>> {
        self.buckets.read().get(name).cloned()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheBucket>> {
        let bucket: Arc<dyn CacheBucket> = self
            .buckets
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryBucket::new(name)))
            .clone();
        Ok(bucket)
    }

    async fn bucket_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.buckets.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.buckets.write().remove(name).is_some())
    }
}

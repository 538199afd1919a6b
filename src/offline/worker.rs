//! Offline cache lifecycle
//!
//! An explicit state machine standing in for the browser's install /
//! activate / fetch events:
//!
//! ```text
//! Installing ──install()──▶ Installed ──activate()──▶ Active ──supersede()──▶ Superseded
//! ```
//!
//! Only an `Active` instance intercepts requests; every other state passes
//! requests straight to the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use reqwest::Url;
use tokio::sync::OnceCell;
use tokio::task::JoinSet;

use super::discovery::DiscoveredAssets;
use super::error::{OfflineError, Result};
use super::host::{CacheBucket, CacheStorage, NetworkFetcher};
use super::scope::Scope;
use super::types::{
    cache_key, AssetRequest, AssetResponse, FetchOptions, FetchResponse, MatchOptions, Method,
    ResponseSource,
};

/// Parallel fetches during install
const PRECACHE_CONCURRENCY: usize = 6;

/// Lifecycle state of one cache instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    Installed,
    Active,
    Superseded,
}

/// How a request is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDecision {
    /// Network-first with cached shell fallback
    Navigation,
    /// Cache-first with background revalidation
    StaticAsset,
    /// Not intercepted
    Passthrough,
}

/// Outcome of `install()`
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    pub version: String,
    pub discovered: usize,
    pub cached: usize,
    /// URL and reason for every asset that could not be precached
    pub failed: Vec<(String, String)>,
}

/// The intercepting asset cache for one cache version
pub struct OfflineCache {
    version: String,
    scope: Scope,
    fetcher: Arc<dyn NetworkFetcher>,
    storage: Arc<dyn CacheStorage>,
    bucket: OnceCell<Arc<dyn CacheBucket>>,
    state: RwLock<WorkerState>,
    skip_waiting: AtomicBool,
    clients_claimed: AtomicBool,
    revalidations: Mutex<JoinSet<()>>,
}

impl OfflineCache {
    /// Bumping `version` is how a deploy forces full invalidation
    pub fn new(
        version: impl Into<String>,
        scope: Scope,
        fetcher: Arc<dyn NetworkFetcher>,
        storage: Arc<dyn CacheStorage>,
    ) -> Self {
        Self {
            version: version.into(),
            scope,
            fetcher,
            storage,
            bucket: OnceCell::new(),
            state: RwLock::new(WorkerState::Installing),
            skip_waiting: AtomicBool::new(false),
            clients_claimed: AtomicBool::new(false),
            revalidations: Mutex::new(JoinSet::new()),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    /// Set once installed: activation does not wait for an older instance
    pub fn skips_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }

    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed.load(Ordering::Acquire)
    }

    async fn bucket(&self) -> Result<Arc<dyn CacheBucket>> {
        self.bucket
            .get_or_try_init(|| self.storage.open(&self.version))
            .await
            .cloned()
    }

    fn transition(&self, from: &[WorkerState], to: WorkerState) -> Result<()> {
        let mut state = self.state.write();
        if !from.contains(&*state) {
            return Err(OfflineError::Lifecycle(format!(
                "{:?} -> {:?} not allowed",
                *state, to
            )));
        }
        tracing::info!(version = %self.version, from = ?*state, to = ?to, "Offline cache state change");
        *state = to;
        Ok(())
    }

    // ------------------------------------------------------------------
    // install
    // ------------------------------------------------------------------

    /// Open the current bucket and precache the discovered asset set.
    ///
    /// Individual asset failures are recorded in the report, never returned.
    /// Only failure to open the bucket itself fails the install.
    pub async fn install(&self) -> Result<InstallReport> {
        if self.state() != WorkerState::Installing {
            return Err(OfflineError::Lifecycle(format!(
                "install from {:?}",
                self.state()
            )));
        }

        let bucket = self.bucket().await?;

        let shell_url = self.scope.shell_url();
        let manifest_url = self.scope.manifest_url();
        let shell = self.fetch_for_discovery(&shell_url).await;
        let manifest = self.fetch_for_discovery(&manifest_url).await;

        let assets = DiscoveredAssets::collect(
            &self.scope,
            shell.as_ref().map(|r| r.text()).as_deref(),
            manifest.as_ref().map(|r| r.text()).as_deref(),
        );

        let mut prefetched = HashMap::new();
        if let Some(response) = shell {
            prefetched.insert(cache_key(&shell_url), response);
        }
        if let Some(response) = manifest {
            prefetched.insert(cache_key(&manifest_url), response);
        }

        let outcomes: Vec<(Url, Result<()>)> = stream::iter(assets.urls().iter().cloned())
            .map(|url| {
                let bucket = bucket.clone();
                let prefetched = prefetched.get(&cache_key(&url)).cloned();
                async move {
                    let outcome = self.precache_one(bucket.as_ref(), &url, prefetched).await;
                    (url, outcome)
                }
            })
            .buffer_unordered(PRECACHE_CONCURRENCY)
            .collect()
            .await;

        let mut report = InstallReport {
            version: self.version.clone(),
            discovered: assets.len(),
            ..InstallReport::default()
        };
        for (url, outcome) in outcomes {
            match outcome {
                Ok(()) => report.cached += 1,
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Precache failed, skipping");
                    report.failed.push((url.to_string(), e.to_string()));
                }
            }
        }

        self.skip_waiting.store(true, Ordering::Release);
        self.transition(&[WorkerState::Installing], WorkerState::Installed)?;

        tracing::info!(
            version = %self.version,
            discovered = report.discovered,
            cached = report.cached,
            failed = report.failed.len(),
            "Offline cache installed"
        );
        Ok(report)
    }

    async fn fetch_for_discovery(&self, url: &Url) -> Option<AssetResponse> {
        match self
            .fetcher
            .fetch(&AssetRequest::get(url.clone()), FetchOptions::default())
            .await
        {
            Ok(response) if response.is_cacheable() => Some(response),
            Ok(response) => {
                tracing::debug!(url = %url, status = response.status, "Discovery document not usable");
                None
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Discovery document unavailable");
                None
            }
        }
    }

    async fn precache_one(
        &self,
        bucket: &dyn CacheBucket,
        url: &Url,
        prefetched: Option<AssetResponse>,
    ) -> Result<()> {
        let response = match prefetched {
            Some(response) => response,
            None => {
                self.fetcher
                    .fetch(&AssetRequest::get(url.clone()), FetchOptions::default())
                    .await?
            }
        };
        if !response.is_cacheable() {
            return Err(OfflineError::fetch(
                url,
                format!("not cacheable (status {})", response.status),
            ));
        }
        bucket.put(url, &response).await
    }

    // ------------------------------------------------------------------
    // activate / supersede
    // ------------------------------------------------------------------

    /// Take control of clients, then delete every bucket that is not the
    /// current version. Returns the deleted bucket names.
    pub async fn activate(&self) -> Result<Vec<String>> {
        // The current bucket must exist before any other is removed
        self.bucket().await?;
        self.transition(&[WorkerState::Installed, WorkerState::Active], WorkerState::Active)?;
        self.clients_claimed.store(true, Ordering::Release);

        let mut deleted = Vec::new();
        for name in self.storage.bucket_names().await? {
            if name == self.version {
                continue;
            }
            match self.storage.delete(&name).await {
                Ok(true) => {
                    tracing::info!(bucket = %name, "Deleted stale cache bucket");
                    deleted.push(name);
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(bucket = %name, error = %e, "Failed to delete stale bucket"),
            }
        }
        Ok(deleted)
    }

    /// Mark this instance as replaced by a newer version
    pub fn supersede(&self) {
        let mut state = self.state.write();
        if *state != WorkerState::Superseded {
            tracing::info!(version = %self.version, "Offline cache superseded");
            *state = WorkerState::Superseded;
        }
    }

    // ------------------------------------------------------------------
    // fetch
    // ------------------------------------------------------------------

    /// Routing decision for a request, without performing it
    pub fn classify(&self, request: &AssetRequest) -> FetchDecision {
        if self.state() != WorkerState::Active
            || request.method != Method::Get
            || !self.scope.contains(&request.url)
        {
            return FetchDecision::Passthrough;
        }
        if request.is_navigation() {
            return FetchDecision::Navigation;
        }
        if self.scope.is_static_asset(&request.url) {
            return FetchDecision::StaticAsset;
        }
        FetchDecision::Passthrough
    }

    /// Handle an intercepted request
    pub async fn fetch(&self, request: AssetRequest) -> Result<FetchResponse> {
        match self.classify(&request) {
            FetchDecision::Navigation => self.network_first(request).await,
            FetchDecision::StaticAsset => self.cache_first(request).await,
            FetchDecision::Passthrough => {
                let response = self.fetcher.fetch(&request, FetchOptions::default()).await?;
                Ok(FetchResponse {
                    response,
                    source: ResponseSource::Passthrough,
                })
            }
        }
    }

    async fn network_first(&self, request: AssetRequest) -> Result<FetchResponse> {
        let shell_url = self.scope.shell_url();

        match self.fetcher.fetch(&request, FetchOptions::no_store()).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.store(&shell_url, &response).await;
                }
                Ok(FetchResponse {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Err(network_error) => {
                let cached = match self.bucket().await {
                    Ok(bucket) => bucket
                        .match_url(&shell_url, MatchOptions { ignore_search: true })
                        .await
                        .unwrap_or_else(|e| {
                            tracing::warn!(error = %e, "Cached shell lookup failed");
                            None
                        }),
                    Err(e) => {
                        tracing::warn!(error = %e, "Cache bucket unavailable");
                        None
                    }
                };

                match cached {
                    Some(response) => {
                        tracing::debug!(url = %request.url, "Network down, serving cached shell");
                        Ok(FetchResponse {
                            response,
                            source: ResponseSource::Cache,
                        })
                    }
                    None => Err(OfflineError::NetworkUnavailable {
                        url: request.url.to_string(),
                        reason: network_error.to_string(),
                    }),
                }
            }
        }
    }

    async fn cache_first(&self, request: AssetRequest) -> Result<FetchResponse> {
        let bucket = match self.bucket().await {
            Ok(bucket) => Some(bucket),
            Err(e) => {
                tracing::warn!(error = %e, "Cache bucket unavailable, going to network");
                None
            }
        };

        if let Some(bucket) = &bucket {
            let cached = bucket
                .match_url(&request.url, MatchOptions { ignore_search: true })
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(url = %request.url, error = %e, "Cache lookup failed");
                    None
                });

            if let Some(response) = cached {
                tracing::debug!(url = %request.url, "Cache hit");
                self.spawn_revalidation(request, bucket.clone());
                return Ok(FetchResponse {
                    response,
                    source: ResponseSource::Cache,
                });
            }
        }

        tracing::debug!(url = %request.url, "Cache miss");
        let response = self.fetcher.fetch(&request, FetchOptions::default()).await?;
        if response.is_cacheable() {
            if let Some(bucket) = &bucket {
                if let Err(e) = bucket.put(&request.url, &response).await {
                    tracing::warn!(url = %request.url, error = %e, "Cache write failed");
                }
            }
        }
        Ok(FetchResponse {
            response,
            source: ResponseSource::Network,
        })
    }

    /// Refresh a cached entry without blocking the response already served
    fn spawn_revalidation(&self, request: AssetRequest, bucket: Arc<dyn CacheBucket>) {
        let fetcher = self.fetcher.clone();
        let mut tasks = self.revalidations.lock();
        while tasks.try_join_next().is_some() {}

        tasks.spawn(async move {
            match fetcher.fetch(&request, FetchOptions::default()).await {
                Ok(response) if response.is_cacheable() => {
                    if let Err(e) = bucket.put(&request.url, &response).await {
                        tracing::debug!(url = %request.url, error = %e, "Revalidation write failed");
                    }
                }
                Ok(response) => {
                    tracing::debug!(url = %request.url, status = response.status, "Revalidation skipped");
                }
                Err(e) => {
                    tracing::debug!(url = %request.url, error = %e, "Revalidation failed, keeping stale copy");
                }
            }
        });
    }

    /// Wait for every outstanding background revalidation
    pub async fn settle(&self) {
        let mut tasks = std::mem::take(&mut *self.revalidations.lock());
        while tasks.join_next().await.is_some() {}
    }

    async fn store(&self, url: &Url, response: &AssetResponse) {
        let outcome = match self.bucket().await {
            Ok(bucket) => bucket.put(url, response).await,
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            tracing::warn!(url = %url, error = %e, "Cache write failed");
        }
    }
}

/// Holds the controlling cache instance and swaps in new versions
pub struct Registration {
    active: RwLock<Option<Arc<OfflineCache>>>,
    network: Arc<dyn NetworkFetcher>,
}

impl Registration {
    /// `network` serves requests while no instance is active
    pub fn new(network: Arc<dyn NetworkFetcher>) -> Self {
        Self {
            active: RwLock::new(None),
            network,
        }
    }

    pub fn active(&self) -> Option<Arc<OfflineCache>> {
        self.active.read().clone()
    }

    /// Install `next`, make it the controller, supersede the previous one,
    /// then let it clean up older buckets.
    pub async fn register(&self, next: Arc<OfflineCache>) -> Result<InstallReport> {
        let report = next.install().await?;

        let previous = self.active.write().replace(next.clone());
        if let Some(previous) = previous {
            if !Arc::ptr_eq(&previous, &next) {
                previous.supersede();
            }
        }

        next.activate().await?;
        Ok(report)
    }

    /// Route a request through the active instance, or straight to the network
    pub async fn fetch(&self, request: AssetRequest) -> Result<FetchResponse> {
        match self.active() {
            Some(cache) => cache.fetch(request).await,
            None => {
                let response = self.network.fetch(&request, FetchOptions::default()).await?;
                Ok(FetchResponse {
                    response,
                    source: ResponseSource::Passthrough,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::host::MemoryCacheStorage;
    use async_trait::async_trait;

    struct StaticFetcher;

    #[async_trait]
    impl NetworkFetcher for StaticFetcher {
        async fn fetch(&self, request: &AssetRequest, _options: FetchOptions) -> Result<AssetResponse> {
            Ok(AssetResponse::ok(request.url.path().to_string()))
        }
    }

    fn cache(version: &str, storage: MemoryCacheStorage) -> OfflineCache {
        OfflineCache::new(
            version,
            Scope::parse("https://books.test/flipbook/").unwrap(),
            Arc::new(StaticFetcher),
            Arc::new(storage),
        )
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_lifecycle_order_is_enforced() {
        let cache = cache("v1", MemoryCacheStorage::new());
        assert_eq!(cache.state(), WorkerState::Installing);
        assert!(cache.activate().await.is_err());

        cache.install().await.unwrap();
        assert_eq!(cache.state(), WorkerState::Installed);
        assert!(cache.skips_waiting());
        assert!(cache.install().await.is_err());

        cache.activate().await.unwrap();
        assert_eq!(cache.state(), WorkerState::Active);
        assert!(cache.clients_claimed());

        cache.supersede();
        assert_eq!(cache.state(), WorkerState::Superseded);
    }

    #[tokio::test]
    async fn test_classify() {
        let cache = cache("v1", MemoryCacheStorage::new());
        let asset = AssetRequest::get(url("https://books.test/flipbook/assets/app.js"));

        // not active yet
        assert_eq!(cache.classify(&asset), FetchDecision::Passthrough);

        cache.install().await.unwrap();
        cache.activate().await.unwrap();

        assert_eq!(cache.classify(&asset), FetchDecision::StaticAsset);
        assert_eq!(
            cache.classify(&AssetRequest::navigate(url("https://books.test/flipbook/reader"))),
            FetchDecision::Navigation
        );
        assert_eq!(
            cache.classify(&asset.clone().with_method(Method::Post)),
            FetchDecision::Passthrough
        );
        assert_eq!(
            cache.classify(&AssetRequest::get(url("https://cdn.test/flipbook/app.js"))),
            FetchDecision::Passthrough
        );
        assert_eq!(
            cache.classify(&AssetRequest::get(url("https://books.test/flipbook/api/pages/3"))),
            FetchDecision::Passthrough
        );
        assert_eq!(
            cache.classify(&AssetRequest::get(url("https://books.test/elsewhere/app.js"))),
            FetchDecision::Passthrough
        );

        cache.supersede();
        assert_eq!(cache.classify(&asset), FetchDecision::Passthrough);
    }

    #[tokio::test]
    async fn test_install_precaches_core_assets() {
        let storage = MemoryCacheStorage::new();
        let cache = cache("v1", storage.clone());
        let report = cache.install().await.unwrap();

        assert_eq!(report.discovered, 5);
        assert_eq!(report.cached, 5);
        assert!(report.failed.is_empty());
        assert_eq!(storage.bucket("v1").unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_registration_supersedes_previous() {
        let storage = MemoryCacheStorage::new();
        let registration = Registration::new(Arc::new(StaticFetcher));

        let first = Arc::new(cache("v1", storage.clone()));
        registration.register(first.clone()).await.unwrap();
        assert_eq!(first.state(), WorkerState::Active);

        let second = Arc::new(cache("v2", storage.clone()));
        registration.register(second.clone()).await.unwrap();

        assert_eq!(first.state(), WorkerState::Superseded);
        assert_eq!(second.state(), WorkerState::Active);
        assert_eq!(storage.bucket_names().await.unwrap(), vec!["v2".to_string()]);
        assert!(Arc::ptr_eq(&registration.active().unwrap(), &second));
    }
}

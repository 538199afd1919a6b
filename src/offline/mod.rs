//! Offline network cache
//!
//! Serves the application's own static assets (and its shell HTML) from a
//! persistent, versioned cache so the viewer keeps working without network.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Registration                        │
//! │   (controlling instance, swaps in new cache versions)  │
//! └────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌────────────────────────────────────────────────────────┐
//! │                    OfflineCache                        │
//! │   install → activate → fetch   (explicit state machine)│
//! └────────────────────────────────────────────────────────┘
//!           │                                   │
//!           ▼                                   ▼
//!   ┌────────────────┐                ┌──────────────────┐
//!   │ NetworkFetcher │                │   CacheStorage   │
//!   │ (ReqwestFetcher│                │ (FsCacheStorage, │
//!   │  or a fake)    │                │  MemoryCache...) │
//!   └────────────────┘                └──────────────────┘
//! ```
//!
//! Routing for an active instance:
//!
//! - navigations: network-first, cached shell as fallback
//! - static assets in scope: cache-first, refreshed in the background
//! - everything else: passed through untouched

mod discovery;
mod error;
mod fetcher;
mod fs_storage;
mod host;
mod scope;
mod types;
mod worker;

pub use discovery::{manifest_icon_sources, scrape_html_references, DiscoveredAssets};
pub use error::{OfflineError, Result};
pub use fetcher::ReqwestFetcher;
pub use fs_storage::{FsBucket, FsCacheStorage};
pub use host::{CacheBucket, CacheStorage, MemoryBucket, MemoryCacheStorage, NetworkFetcher};
pub use scope::{
    has_static_extension, Scope, CORE_ICONS, MANIFEST_DOCUMENT, SHELL_DOCUMENT, STATIC_EXTENSIONS,
};
pub use types::{
    cache_key, cache_key_without_search, AssetRequest, AssetResponse, FetchOptions,
    FetchResponse, MatchOptions, Method, RequestMode, ResponseSource, ResponseType,
};
pub use worker::{FetchDecision, InstallReport, OfflineCache, Registration, WorkerState};

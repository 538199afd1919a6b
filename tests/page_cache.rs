//! Page render cache behaviour against a fake decode provider

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{fake_pdf, FakeProvider};
use flipbook_offline::render::{
    DocumentLoadError, DocumentSource, ImageFormat, PageRenderCache, PageRenderError, RenderConfig,
};

fn cache_with(provider: &Arc<FakeProvider>) -> PageRenderCache {
    PageRenderCache::new(
        provider.clone(),
        RenderConfig {
            format: ImageFormat::Png,
            ..RenderConfig::default()
        },
    )
}

fn source(name: &str, pages: u32, width: u32) -> DocumentSource {
    DocumentSource::from_bytes(fake_pdf(name, pages, width))
}

#[tokio::test]
async fn test_pages_in_range_are_present_and_out_of_range_absent() {
    let provider = FakeProvider::new();
    let cache = cache_with(&provider);
    let total = cache.open_document(source("doc", 8, 100)).await.unwrap();
    assert_eq!(total, 8);

    for page in 1..=8 {
        cache.ensure_page_loaded(page, true).await.unwrap();
        assert!(cache.get_page(page).is_some(), "page {} missing", page);
    }
    for page in [0, 9, 100] {
        cache.ensure_page_loaded(page, true).await.unwrap();
        assert!(cache.get_page(page).is_none());
    }
    assert_eq!(provider.renders("doc"), 8);
}

#[tokio::test]
async fn test_resident_count_never_exceeds_capacity() {
    let provider = FakeProvider::new();
    let cache = cache_with(&provider);
    cache.open_document(source("long", 60, 50)).await.unwrap();

    let sequence = [1, 2, 3, 30, 31, 1, 59, 60, 12, 13, 14, 15, 16, 17, 18, 19, 20, 5, 45, 44];
    for page in sequence {
        cache.focus_page(page).await.unwrap();
        cache.settle().await;
        assert!(cache.resident_pages().len() <= 10);
        assert!(cache.get_page(page).is_some());
    }
    assert!(cache.images().live_count() <= 10);
}

#[tokio::test]
async fn test_jump_evicts_pages_farthest_from_new_focus() {
    let provider = FakeProvider::new();
    let cache = cache_with(&provider);
    cache.open_document(source("doc", 40, 50)).await.unwrap();

    for page in 1..=10 {
        cache.ensure_page_loaded(page, true).await.unwrap();
    }
    assert_eq!(cache.resident_pages(), (1..=10).collect::<Vec<_>>());

    let evicted_handle = cache.get_page(1).unwrap().image;
    let rendered = cache.render_page(20).await.unwrap();
    assert_eq!(rendered.page_number, 20);

    let expected: Vec<u32> = (2..=10).chain([20]).collect();
    assert_eq!(cache.resident_pages(), expected);
    assert!(cache.images().resolve(&evicted_handle).is_none());
}

#[tokio::test]
async fn test_concurrent_requests_share_one_render() {
    let provider = FakeProvider::new();
    let gate = provider.gate_renders();
    let cache = cache_with(&provider);
    cache.open_document(source("doc", 10, 50)).await.unwrap();

    let first = tokio::spawn({
        let cache = cache.clone();
        async move { cache.ensure_page_loaded(5, true).await }
    });
    provider.rendering.notified().await;

    let second = tokio::spawn({
        let cache = cache.clone();
        async move { cache.ensure_page_loaded(5, false).await }
    });
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    assert_eq!(cache.stats().in_flight, 1);

    gate.add_permits(10);
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    assert_eq!(provider.renders("doc"), 1);
    assert!(cache.get_page(5).is_some());
    assert_eq!(cache.stats().in_flight, 0);
}

#[tokio::test]
async fn test_superseded_load_never_reaches_the_cache() {
    let provider = FakeProvider::new();
    let gate_a = provider.gate_open("a");
    let cache = cache_with(&provider);

    let load_a = tokio::spawn({
        let cache = cache.clone();
        async move { cache.open_document(source("a", 3, 10)).await }
    });
    provider.opened.notified().await;

    let total_b = cache.open_document(source("b", 5, 20)).await.unwrap();
    assert_eq!(total_b, 5);

    gate_a.add_permits(1);
    assert_eq!(load_a.await.unwrap(), Err(DocumentLoadError::Superseded));
    assert!(provider.stats("a").destroyed.load(Ordering::SeqCst));
    assert!(!provider.stats("b").destroyed.load(Ordering::SeqCst));

    assert_eq!(cache.state().total_pages, 5);
    for page in 1..=5 {
        let rendered = cache.render_page(page).await.unwrap();
        // b renders 20pt wide pages at scale 1.5
        assert_eq!(rendered.width, 30);
    }
    assert_eq!(provider.renders("a"), 0);
    assert_eq!(provider.renders("b"), 5);
}

#[tokio::test]
async fn test_render_started_before_reopen_is_discarded() {
    let provider = FakeProvider::new();
    let gate = provider.gate_renders();
    let cache = cache_with(&provider);
    cache.open_document(source("a", 4, 10)).await.unwrap();

    let stale = tokio::spawn({
        let cache = cache.clone();
        async move { cache.ensure_page_loaded(2, true).await }
    });
    provider.rendering.notified().await;

    // b's document renders through the same gate
    gate.add_permits(100);
    cache.open_document(source("b", 4, 20)).await.unwrap();

    let outcome = stale.await.unwrap();
    assert!(matches!(outcome, Ok(()) | Err(PageRenderError::Superseded)));

    for page in cache.resident_pages() {
        assert_eq!(cache.get_page(page).unwrap().width, 30);
    }
    let rendered = cache.render_page(2).await.unwrap();
    assert_eq!(rendered.width, 30);
}

#[tokio::test]
async fn test_six_page_import_scenario() {
    let provider = FakeProvider::new();
    let cache = cache_with(&provider);

    let total = cache.open_document(source("six", 6, 612)).await.unwrap();
    assert_eq!(total, 6);
    let state = cache.state();
    assert_eq!(state.total_pages, 6);
    assert!(!state.loading);
    assert!(state.error.is_none());

    let first = cache.render_page(1).await.unwrap();
    assert!(first.width > 0 && first.height > 0);
    let image = cache.images().resolve(&first.image).unwrap();
    assert_eq!(&image.bytes[..4], &[0x89, b'P', b'N', b'G']);

    for page in [0, 7] {
        assert!(cache.ensure_page_loaded(page, true).await.is_ok());
        assert!(cache.get_page(page).is_none());
        cache.focus_page(page).await.unwrap();
    }
    assert!(matches!(
        cache.render_page(7).await,
        Err(PageRenderError::OutOfRange { page: 7, total: 6 })
    ));
    assert!(cache.state().error.is_none());
}

#[tokio::test]
async fn test_focus_prefetches_neighbours() {
    let provider = FakeProvider::new();
    let cache = cache_with(&provider);
    cache.open_document(source("doc", 6, 50)).await.unwrap();

    cache.focus_page(3).await.unwrap();
    cache.settle().await;
    assert_eq!(cache.resident_pages(), vec![2, 3, 4]);

    cache.focus_page(6).await.unwrap();
    cache.settle().await;
    assert_eq!(cache.resident_pages(), vec![2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn test_unreadable_document_reports_error() {
    let provider = FakeProvider::new();
    let cache = cache_with(&provider);

    let result = cache
        .open_document(DocumentSource::from_bytes(b"%PDF-garbage".to_vec()))
        .await;
    assert!(matches!(result, Err(DocumentLoadError::Unreadable(_))));

    let state = cache.state();
    assert!(!state.loading);
    assert!(state.error.is_some());
    assert_eq!(state.total_pages, 0);
}

#[tokio::test]
async fn test_render_failure_surfaces_only_for_priority_and_is_retryable() {
    let provider = FakeProvider::new();
    let cache = cache_with(&provider);
    cache.open_document(source("doc", 6, 50)).await.unwrap();
    provider.fail_page(4);

    // background request: silent, page left for a later attempt
    assert_eq!(cache.ensure_page_loaded(4, false).await, Ok(()));
    assert!(cache.get_page(4).is_none());
    assert!(cache.state().error.is_none());

    let failed = cache.ensure_page_loaded(4, true).await;
    assert!(matches!(failed, Err(PageRenderError::Raster { page: 4, .. })));
    assert!(cache.get_page(4).is_none());
    assert!(cache.state().error.is_some());
    assert_eq!(cache.stats().in_flight, 0);

    provider.heal_page(4);
    cache.ensure_page_loaded(4, true).await.unwrap();
    assert!(cache.get_page(4).is_some());
    assert!(cache.state().error.is_none());
    assert_eq!(provider.renders("doc"), 3);
}

#[tokio::test]
async fn test_abandoned_render_still_completes() {
    let provider = FakeProvider::new();
    let gate = provider.gate_renders();
    let cache = cache_with(&provider);
    cache.open_document(source("doc", 6, 50)).await.unwrap();

    let caller = tokio::spawn({
        let cache = cache.clone();
        async move { cache.ensure_page_loaded(3, true).await }
    });
    provider.rendering.notified().await;
    caller.abort();
    assert!(caller.await.unwrap_err().is_cancelled());
    assert_eq!(cache.stats().in_flight, 1);

    gate.add_permits(1);
    tokio::time::timeout(Duration::from_secs(5), async {
        while cache.stats().in_flight > 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    assert!(cache.get_page(3).is_some());
    assert_eq!(provider.renders("doc"), 1);
}

//! Precache discovery
//!
//! The set of URLs to precache on install: the fixed core list plus whatever
//! the served entry HTML references plus the manifest's icons. Scraping is
//! best-effort; malformed HTML or JSON just contributes nothing.

use std::cell::RefCell;
use std::collections::HashSet;

use lol_html::{element, rewrite_str, RewriteStrSettings};
use reqwest::Url;
use serde::Deserialize;

use super::scope::Scope;

/// Ordered, de-duplicated set of URLs to precache
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredAssets {
    urls: Vec<Url>,
    seen: HashSet<String>,
}

impl DiscoveredAssets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a URL; returns false if it was already present
    pub fn insert(&mut self, mut url: Url) -> bool {
        url.set_fragment(None);
        if !self.seen.insert(url.to_string()) {
            return false;
        }
        self.urls.push(url);
        true
    }

    pub fn urls(&self) -> &[Url] {
        &self.urls
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn contains(&self, url: &Url) -> bool {
        let mut url = url.clone();
        url.set_fragment(None);
        self.seen.contains(url.as_str())
    }

    /// Core list, then filtered scraped URLs, then filtered icons
    pub fn collect(scope: &Scope, html: Option<&str>, manifest: Option<&str>) -> Self {
        let mut assets = Self::new();
        for url in scope.core_assets() {
            assets.insert(url);
        }

        let base = scope.shell_url();
        let scraped = html.map(scrape_html_references).unwrap_or_default();
        let icons = manifest.map(manifest_icon_sources).unwrap_or_default();

        // Manifest icon paths resolve against the manifest's own URL
        let manifest_base = scope.manifest_url();
        let candidates = scraped
            .iter()
            .filter_map(|reference| base.join(reference).ok())
            .chain(
                icons
                    .iter()
                    .filter_map(|reference| manifest_base.join(reference).ok()),
            );

        for url in candidates {
            if scope.is_precacheable(&url) {
                assets.insert(url);
            }
        }

        assets
    }
}

/// References (`src` / `href`) found in the HTML that could be assets
pub fn scrape_html_references(html: &str) -> Vec<String> {
    let found = RefCell::new(Vec::new());
    let push = |value: Option<String>| {
        if let Some(value) = value {
            let value = value.trim();
            if !value.is_empty() && !value.starts_with("data:") && !value.starts_with('#') {
                found.borrow_mut().push(value.to_string());
            }
        }
    };

    let result = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("script[src]", |el| {
                    push(el.get_attribute("src"));
                    Ok(())
                }),
                element!("link[href]", |el| {
                    push(el.get_attribute("href"));
                    Ok(())
                }),
                element!("img[src]", |el| {
                    push(el.get_attribute("src"));
                    Ok(())
                }),
                element!("source[src]", |el| {
                    push(el.get_attribute("src"));
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    );

    if let Err(e) = result {
        tracing::debug!(error = %e, "Entry HTML could not be fully scanned");
    }
    found.into_inner()
}

#[derive(Deserialize)]
struct Manifest {
    #[serde(default)]
    icons: Vec<ManifestIcon>,
}

#[derive(Deserialize)]
struct ManifestIcon {
    src: String,
}

/// `src` of every icon in a web manifest
pub fn manifest_icon_sources(manifest: &str) -> Vec<String> {
    match serde_json::from_str::<Manifest>(manifest) {
        Ok(manifest) => manifest.icons.into_iter().map(|icon| icon.src).collect(),
        Err(e) => {
            tracing::debug!(error = %e, "Web manifest could not be parsed");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY_HTML: &str = r#"<!doctype html>
<html>
<head>
  <link rel="manifest" href="manifest.webmanifest">
  <link rel="stylesheet" href="./assets/index-4f2a.css">
  <link rel="preconnect" href="https://fonts.example.com">
  <script type="module" src="/flipbook/assets/index-9c1d.js"></script>
</head>
<body>
  <img src="data:image/png;base64,AAAA">
  <img src="icons/logo.svg">
  <a href="about">About</a>
</body>
</html>"#;

    const MANIFEST: &str = r#"{
  "name": "Flipbook",
  "icons": [
    { "src": "icons/icon-192.png", "sizes": "192x192" },
    { "src": "icons/maskable.png", "sizes": "512x512" },
    { "src": "https://cdn.example.com/icon.png" }
  ]
}"#;

    fn scope() -> Scope {
        Scope::parse("https://books.test/flipbook/").unwrap()
    }

    #[test]
    fn test_scrape_html_references() {
        let refs = scrape_html_references(ENTRY_HTML);
        assert!(refs.contains(&"./assets/index-4f2a.css".to_string()));
        assert!(refs.contains(&"/flipbook/assets/index-9c1d.js".to_string()));
        assert!(refs.contains(&"icons/logo.svg".to_string()));
        assert!(!refs.iter().any(|r| r.starts_with("data:")));
        // anchors are not assets
        assert!(!refs.contains(&"about".to_string()));
    }

    #[test]
    fn test_manifest_icons() {
        let icons = manifest_icon_sources(MANIFEST);
        assert_eq!(icons.len(), 3);
        assert!(manifest_icon_sources("not json").is_empty());
        assert!(manifest_icon_sources("{}").is_empty());
    }

    #[test]
    fn test_collect_filters_and_dedupes() {
        let assets = DiscoveredAssets::collect(&scope(), Some(ENTRY_HTML), Some(MANIFEST));
        let urls: Vec<&str> = assets.urls().iter().map(|u| u.as_str()).collect();

        // core list first, in order
        assert_eq!(
            &urls[..5],
            &[
                "https://books.test/flipbook/",
                "https://books.test/flipbook/index.html",
                "https://books.test/flipbook/manifest.webmanifest",
                "https://books.test/flipbook/icons/icon-192.png",
                "https://books.test/flipbook/icons/icon-512.png",
            ]
        );
        assert!(urls.contains(&"https://books.test/flipbook/assets/index-4f2a.css"));
        assert!(urls.contains(&"https://books.test/flipbook/assets/index-9c1d.js"));
        assert!(urls.contains(&"https://books.test/flipbook/icons/logo.svg"));
        assert!(urls.contains(&"https://books.test/flipbook/icons/maskable.png"));
        // cross-origin entries are dropped
        assert!(!urls.iter().any(|u| u.contains("example.com")));
        // icon-192 appears in the core list and the manifest but only once
        assert_eq!(
            urls.iter()
                .filter(|u| u.ends_with("icons/icon-192.png"))
                .count(),
            1
        );
        // manifest.webmanifest is not a static extension but is core
        assert_eq!(assets.len(), 9);
    }

    #[test]
    fn test_collect_without_documents_is_core_only() {
        let assets = DiscoveredAssets::collect(&scope(), None, None);
        assert_eq!(assets.len(), 5);
    }
}

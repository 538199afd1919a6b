//! Registration scope and static-asset matching
//!
//! The application may be served from a sub-path (`/flipbook/`), so every key
//! and every routing decision is computed relative to the scope rather than
//! the site root.

use reqwest::Url;

use super::error::{OfflineError, Result};

/// File extensions treated as static application assets
pub const STATIC_EXTENSIONS: &[&str] = &[
    "css", "js", "mjs", "json", "png", "jpg", "jpeg", "webp", "svg", "gif", "ico", "woff",
    "woff2", "ttf",
];

/// Shell document name, relative to the scope
pub const SHELL_DOCUMENT: &str = "index.html";

/// Web manifest name, relative to the scope
pub const MANIFEST_DOCUMENT: &str = "manifest.webmanifest";

/// Icons precached alongside the shell
pub const CORE_ICONS: &[&str] = &["icons/icon-192.png", "icons/icon-512.png"];

/// Path prefixes (relative to the scope) always treated as static
const STATIC_PREFIXES: &[&str] = &["assets/", "icons/"];

/// Whether a path ends in one of the static extensions
pub fn has_static_extension(path: &str) -> bool {
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => STATIC_EXTENSIONS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext)),
        _ => false,
    }
}

/// The registration scope: an origin plus a path prefix ending in `/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    base: Url,
}

impl Scope {
    /// Build a scope from its absolute URL (e.g. `https://host/flipbook/`)
    pub fn new(mut base: Url) -> Result<Self> {
        if base.cannot_be_a_base() {
            return Err(OfflineError::InvalidUrl(base.to_string()));
        }
        base.set_query(None);
        base.set_fragment(None);
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base })
    }

    pub fn parse(scope: &str) -> Result<Self> {
        let url = Url::parse(scope).map_err(|e| OfflineError::InvalidUrl(format!("{scope}: {e}")))?;
        Self::new(url)
    }

    /// Scope root URL
    pub fn root(&self) -> &Url {
        &self.base
    }

    /// Scope path prefix, always ending in `/`
    pub fn path(&self) -> &str {
        self.base.path()
    }

    /// Resolve a scope-relative (or absolute) reference
    pub fn resolve(&self, reference: &str) -> Result<Url> {
        self.base
            .join(reference)
            .map_err(|e| OfflineError::InvalidUrl(format!("{reference}: {e}")))
    }

    pub fn shell_url(&self) -> Url {
        self.resolve(SHELL_DOCUMENT).unwrap_or_else(|_| self.base.clone())
    }

    pub fn manifest_url(&self) -> Url {
        self.resolve(MANIFEST_DOCUMENT)
            .unwrap_or_else(|_| self.base.clone())
    }

    /// Root, shell, manifest and core icons
    pub fn core_assets(&self) -> Vec<Url> {
        let mut urls = vec![self.base.clone(), self.shell_url(), self.manifest_url()];
        urls.extend(CORE_ICONS.iter().filter_map(|icon| self.resolve(icon).ok()));
        urls
    }

    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.base.origin()
    }

    /// Same origin and under the scope path
    pub fn contains(&self, url: &Url) -> bool {
        self.is_same_origin(url) && url.path().starts_with(self.path())
    }

    /// Path of `url` relative to the scope, if it is inside it
    pub fn relative_path<'a>(&self, url: &'a Url) -> Option<&'a str> {
        if !self.is_same_origin(url) {
            return None;
        }
        url.path().strip_prefix(self.path())
    }

    /// Scope root, shell document, `assets/`, `icons/`, or a static extension
    pub fn is_static_asset(&self, url: &Url) -> bool {
        let Some(relative) = self.relative_path(url) else {
            return false;
        };
        relative.is_empty()
            || relative == SHELL_DOCUMENT
            || STATIC_PREFIXES.iter().any(|prefix| relative.starts_with(prefix))
            || has_static_extension(relative)
    }

    /// Filter used for discovered URLs: same origin, and a static extension
    /// or an `assets/` path
    pub fn is_precacheable(&self, url: &Url) -> bool {
        if !self.is_same_origin(url) {
            return false;
        }
        let in_assets = self
            .relative_path(url)
            .map(|relative| relative.starts_with("assets/"))
            .unwrap_or(false);
        in_assets || has_static_extension(url.path())
    }
}

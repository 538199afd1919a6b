//! Application state management

use std::sync::Arc;

use reqwest::Url;

use crate::config::Config;
use crate::offline::Registration;
use crate::viewer::Viewer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    viewer: Viewer,
    registration: Arc<Registration>,
}

impl AppState {
    pub fn new(config: Config, viewer: Viewer, registration: Arc<Registration>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                viewer,
                registration,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Origin proxied requests are resolved against
    pub fn upstream(&self) -> &Url {
        &self.inner.config.offline.upstream
    }

    pub fn viewer(&self) -> &Viewer {
        &self.inner.viewer
    }

    pub fn registration(&self) -> &Registration {
        &self.inner.registration
    }
}

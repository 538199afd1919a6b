//! Configuration management for the flipbook server

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

use crate::render::{ImageFormat, RenderConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is not a valid URL: {reason}")]
    InvalidUrl { var: &'static str, reason: String },

    #[error("{var} is invalid: {reason}")]
    InvalidValue { var: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub offline: OfflineConfig,
    pub store: StoreConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct OfflineConfig {
    /// Origin serving the app shell and its assets
    pub upstream: Url,
    /// Path under `upstream` the cache controls
    pub scope: String,
    /// Bucket name; bump to retire every older bucket on activation
    pub version: String,
    pub cache_dir: PathBuf,
    pub fetch_timeout: Duration,
}

impl OfflineConfig {
    /// Absolute scope URL
    pub fn scope_url(&self) -> Result<Url, ConfigError> {
        self.upstream
            .join(&self.scope)
            .map_err(|e| ConfigError::InvalidUrl {
                var: "FLIPBOOK_SCOPE",
                reason: e.to_string(),
            })
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub dir: PathBuf,
}

const DEFAULT_UPSTREAM: &str = "http://localhost:5173";

fn default_upstream() -> Url {
    Url::parse(DEFAULT_UPSTREAM).expect("default upstream is a valid URL")
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            offline: OfflineConfig {
                upstream: default_upstream(),
                scope: "/".to_string(),
                version: "flipbook-v1".to_string(),
                cache_dir: PathBuf::from("./data/cache"),
                fetch_timeout: Duration::from_secs(30),
            },
            store: StoreConfig {
                dir: PathBuf::from("./data/store"),
            },
            render: RenderConfig::default(),
        }
    }
}

/// Resident page capacity; at least one page must fit
fn parse_capacity(value: &str) -> Result<usize, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        var: "FLIPBOOK_PAGE_CAPACITY",
        reason,
    };
    match value.trim().parse::<usize>() {
        Ok(0) => Err(invalid("must be at least 1".to_string())),
        Ok(capacity) => Ok(capacity),
        Err(e) => Err(invalid(e.to_string())),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let capacity = match env::var("FLIPBOOK_PAGE_CAPACITY") {
            Ok(value) => parse_capacity(&value)?,
            Err(_) => defaults.render.capacity,
        };

        let upstream = match env::var("FLIPBOOK_UPSTREAM") {
            Ok(value) => Url::parse(&value).map_err(|e| ConfigError::InvalidUrl {
                var: "FLIPBOOK_UPSTREAM",
                reason: e.to_string(),
            })?,
            Err(_) => defaults.offline.upstream,
        };

        let format = match env::var("FLIPBOOK_IMAGE_FORMAT") {
            Ok(value) => value
                .parse::<ImageFormat>()
                .map_err(|reason| ConfigError::InvalidValue {
                    var: "FLIPBOOK_IMAGE_FORMAT",
                    reason,
                })?,
            Err(_) => defaults.render.format,
        };

        let config = Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.server.port),
            },
            offline: OfflineConfig {
                upstream,
                scope: env::var("FLIPBOOK_SCOPE").unwrap_or(defaults.offline.scope),
                version: env::var("FLIPBOOK_CACHE_VERSION").unwrap_or(defaults.offline.version),
                cache_dir: env::var("FLIPBOOK_CACHE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.offline.cache_dir),
                fetch_timeout: env::var("FLIPBOOK_FETCH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.offline.fetch_timeout),
            },
            store: StoreConfig {
                dir: env::var("FLIPBOOK_STORE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.store.dir),
            },
            render: RenderConfig {
                capacity,
                device_pixel_ratio: env::var("FLIPBOOK_DEVICE_PIXEL_RATIO")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.render.device_pixel_ratio),
                format,
                ..defaults.render
            },
        };

        config.offline.scope_url()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.offline.version, "flipbook-v1");
        assert_eq!(config.render.capacity, 10);
        assert_eq!(
            config.offline.scope_url().unwrap().as_str(),
            "http://localhost:5173/"
        );
    }

    #[test]
    fn test_page_capacity_must_hold_a_page() {
        assert_eq!(parse_capacity("12").unwrap(), 12);
        assert_eq!(parse_capacity(" 1 ").unwrap(), 1);
        assert!(matches!(
            parse_capacity("0"),
            Err(ConfigError::InvalidValue { var: "FLIPBOOK_PAGE_CAPACITY", .. })
        ));
        assert!(parse_capacity("-3").is_err());
        assert!(parse_capacity("many").is_err());
    }

    #[test]
    fn test_scope_url_joins_path() {
        let mut config = Config::default();
        config.offline.scope = "/flipbook/".to_string();
        assert_eq!(
            config.offline.scope_url().unwrap().as_str(),
            "http://localhost:5173/flipbook/"
        );
    }
}

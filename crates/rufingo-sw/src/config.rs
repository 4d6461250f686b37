//! Worker configuration

use std::path::Path;

use rufingo_common::{RufingoError, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// How intercepted requests are answered. Fixed per worker build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStrategy {
    /// Serve from cache when present, otherwise fetch without storing.
    #[default]
    CacheFirst,
    /// Fetch and store; serve from cache only when the network fails.
    NetworkFirst,
}

/// What a notification click does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClickBehavior {
    /// Always open a new window.
    OpenWindow,
    /// Focus a window already showing the target URL, else open one.
    #[default]
    FocusExisting,
}

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Origin the worker is registered on; precache paths resolve against it
    pub origin: Url,

    /// Cache name prefix
    pub cache_prefix: String,

    /// Version tag; bumping it starts a new cache generation
    pub version: String,

    /// Paths stored at install time
    pub precache: Vec<String>,

    /// Fetch strategy
    pub strategy: CacheStrategy,

    /// Activate right after install instead of waiting
    pub skip_waiting: bool,

    /// Take control of open windows on activate
    pub claim_clients: bool,

    /// Notification click behavior
    pub click_behavior: ClickBehavior,

    /// Notification fallbacks
    pub notification: NotificationDefaults,
}

/// Values used when a push payload leaves a field out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationDefaults {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub url: String,
    /// Vibration pattern in milliseconds
    pub vibrate: Vec<u32>,
    /// Same-tag notifications replace each other
    pub tag: String,
    /// Keep the notification until the user acts on it
    pub require_interaction: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse("http://localhost:8000/").expect("static origin parses"),
            cache_prefix: "rufingo".to_string(),
            version: "v1".to_string(),
            precache: vec!["/".to_string(), "/static/manifest.json".to_string()],
            strategy: CacheStrategy::default(),
            skip_waiting: false,
            claim_clients: false,
            click_behavior: ClickBehavior::default(),
            notification: NotificationDefaults::default(),
        }
    }
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            title: "Rufingo".to_string(),
            body: "¡Tienes tarjetas pendientes para repasar!".to_string(),
            icon: "/static/icon-192.png".to_string(),
            badge: "/static/icon-192.png".to_string(),
            url: "/".to_string(),
            vibrate: vec![200, 100, 200],
            tag: "rufingo-notification".to_string(),
            require_interaction: false,
        }
    }
}

impl WorkerConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RufingoError::config_with_source("invalid worker config", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Reject configs that cannot name a cache or resolve the precache list.
    pub fn validate(&self) -> Result<()> {
        if self.cache_prefix.trim().is_empty() {
            return Err(RufingoError::config("cache_prefix must not be empty"));
        }
        if self.version.trim().is_empty() {
            return Err(RufingoError::config("version must not be empty"));
        }
        if self.origin.cannot_be_a_base() {
            return Err(RufingoError::config(format!(
                "origin {} cannot resolve relative paths",
                self.origin
            )));
        }
        self.precache_urls().map(|_| ())
    }

    /// Name of the current cache generation, e.g. `rufingo-v1`.
    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.cache_prefix, self.version)
    }

    /// Precache paths resolved against the origin, in manifest order.
    pub fn precache_urls(&self) -> Result<Vec<Url>> {
        self.precache
            .iter()
            .map(|path| {
                self.origin.join(path).map_err(|e| {
                    RufingoError::config_with_source(format!("bad precache path {}", path), e)
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.cache_name(), "rufingo-v1");
        assert_eq!(config.strategy, CacheStrategy::CacheFirst);
        assert_eq!(config.click_behavior, ClickBehavior::FocusExisting);
        assert_eq!(config.notification.vibrate, vec![200, 100, 200]);
        assert!(!config.notification.require_interaction);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_precache_urls_resolve_against_origin() {
        let config = WorkerConfig::default();
        let urls: Vec<String> = config
            .precache_urls()
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            urls,
            vec![
                "http://localhost:8000/",
                "http://localhost:8000/static/manifest.json"
            ]
        );
    }

    #[test]
    fn test_from_json_partial() {
        let config = WorkerConfig::from_json(
            r#"{
                "version": "v7",
                "strategy": "network-first",
                "click_behavior": "open-window",
                "notification": { "require_interaction": true, "icon": "/static/android-chrome-192x192.png" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.cache_name(), "rufingo-v7");
        assert_eq!(config.strategy, CacheStrategy::NetworkFirst);
        assert_eq!(config.click_behavior, ClickBehavior::OpenWindow);
        assert!(config.notification.require_interaction);
        assert_eq!(config.notification.icon, "/static/android-chrome-192x192.png");
        assert_eq!(config.notification.title, "Rufingo");
    }

    #[test]
    fn test_empty_version_rejected() {
        let err = WorkerConfig::from_json(r#"{ "version": " " }"#).unwrap_err();
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let err = WorkerConfig::from_json(r#"{ "strategy": "stale-while-revalidate" }"#).unwrap_err();
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.json");
        std::fs::write(&path, r#"{ "cache_prefix": "flash", "version": "v2" }"#).unwrap();

        let config = WorkerConfig::load(&path).unwrap();
        assert_eq!(config.cache_name(), "flash-v2");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = WorkerConfig::load(&dir.path().join("nope.json")).unwrap_err();
        assert_eq!(err.category(), "io");
    }
}

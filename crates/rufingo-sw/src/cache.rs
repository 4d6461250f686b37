//! Cache storage: named buckets of request identity → response snapshot.

use std::fs;
use std::path::Path;

use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use rufingo_common::ResultExt;
use rufingo_net::{Request, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::{Result, ServiceWorkerError};

/// A cached request/response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Response URL.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response headers, in wire order. Values are raw bytes.
    pub headers: Vec<(String, Vec<u8>)>,

    /// Response body.
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Snapshot a response so the original can still be handed to the caller.
    pub fn from_response(request: &Request, response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .map(|(name, value)| {
(name.as_str().to_string(), value.as_bytes().to_vec())
            })
            .collect();

        Self {
            url: response.url.to_string(),
            method: request.method.to_string(),
            status: response.status.as_u16(),
            headers,
            body: response.body().to_vec(),
            cached_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        }
    }

    /// Rebuild a response from the snapshot.
    pub fn to_response(&self) -> Result<Response> {
        let url = Url::parse(&self.url)
            .map_err(|e| ServiceWorkerError::CacheError(format!("{}: {}", self.url, e)))?;
        let status = StatusCode::from_u16(self.status)
            .map_err(|e| ServiceWorkerError::CacheError(e.to_string()))?;

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ServiceWorkerError::CacheError(e.to_string()))?;
            let value = HeaderValue::from_bytes(value)
                .map_err(|e| ServiceWorkerError::CacheError(e.to_string()))?;
            headers.append(name, value);
        }

        Ok(Response::new(url, status, headers, Bytes::from(self.body.clone())))
    }
}

/// A cache instance.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    /// Cached entries.
    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request identity.
    pub fn match_request(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Store an entry, replacing any previous one for the key.
    pub fn put(&mut self, key: &str, entry: CacheEntry) {
        self.entries.insert(key.to_string(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cache storage (the `caches` global).
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,

    /// Generation that was last activated. Written with the snapshot so a
    /// restarted worker can keep serving it.
    #[serde(default)]
    active: Option<String>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a cache (creates if doesn't exist).
    pub fn open(&mut self, name: &str) -> &mut Cache {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    /// Get a cache without creating it.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Check if cache exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a cache.
    pub fn delete(&mut self, name: &str) -> bool {
        if self.active.as_deref() == Some(name) {
            self.active = None;
        }
        self.caches.remove(name).is_some()
    }

    /// Record `name` as the active generation.
    pub fn set_active(&mut self, name: &str) {
        self.active = Some(name.to_string());
    }

    /// The active generation, if its bucket still exists.
    pub fn active(&self) -> Option<&str> {
        self.active
            .as_deref()
            .filter(|name| self.caches.contains_key(*name))
    }

    /// Get all cache names, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.keys().cloned().collect();
        names.sort();
        names
    }

    /// Match across all caches.
    pub fn match_request(&self, key: &str) -> Option<&CacheEntry> {
        self.caches
            .values()
            .find_map(|cache| cache.match_request(key))
    }

    /// Load a snapshot written by [`CacheStorage::persist`]. A missing file
    /// yields empty storage.
    pub fn load(path: &Path) -> rufingo_common::Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No cache snapshot, starting empty");
            return Ok(Self::new());
        }

        let data = fs::read(path)?;
        let storage: Self = serde_json::from_slice(&data)?;
        debug!(path = %path.display(), caches = storage.caches.len(), "Loaded cache snapshot");
        Ok(storage)
    }

    /// Write a snapshot to `path`, replacing it atomically.
    pub fn persist(&self, path: &Path) -> rufingo_common::Result<()> {
        let data = serde_json::to_vec(self)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, path).context("replacing cache snapshot")?;
        debug!(path = %path.display(), caches = self.caches.len(), "Persisted cache snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, body: &[u8]) -> CacheEntry {
        CacheEntry {
            url: url.to_string(),
            method: "GET".to_string(),
            status: 200,
            headers: vec![("content-type".to_string(), b"text/html".to_vec())],
            body: body.to_vec(),
            cached_at: 0,
        }
    }

    #[test]
    fn test_cache() {
        let mut cache = Cache::new("rufingo-v1");

        cache.put("https://example.com/", entry("https://example.com/", b"<html>"));

        assert!(cache.match_request("https://example.com/").is_some());
        assert!(cache.match_request("https://example.com/other").is_none());
    }

    #[test]
    fn test_cache_put_overwrites() {
        let mut cache = Cache::new("rufingo-v1");
        cache.put("https://example.com/", entry("https://example.com/", b"old"));
        cache.put("https://example.com/", entry("https://example.com/", b"new"));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.match_request("https://example.com/").unwrap().body, b"new");
    }

    #[test]
    fn test_cache_storage() {
        let mut storage = CacheStorage::new();

        assert!(!storage.has("rufingo-v1"));

        storage.open("rufingo-v1");
        assert!(storage.has("rufingo-v1"));

        assert!(storage.delete("rufingo-v1"));
        assert!(!storage.has("rufingo-v1"));
    }

    #[test]
    fn test_active_generation() {
        let mut storage = CacheStorage::new();
        assert_eq!(storage.active(), None);

        storage.open("rufingo-v1");
        storage.set_active("rufingo-v1");
        assert_eq!(storage.active(), Some("rufingo-v1"));

        storage.delete("rufingo-v1");
        assert_eq!(storage.active(), None);

        // recorded but never opened
        storage.set_active("rufingo-v2");
        assert_eq!(storage.active(), None);
    }

    #[test]
    fn test_cache_storage_keys_sorted() {
        let mut storage = CacheStorage::new();
        storage.open("rufingo-v2");
        storage.open("rufingo-v1");

        assert_eq!(storage.keys(), vec!["rufingo-v1", "rufingo-v2"]);
    }

    #[test]
    fn test_storage_match_searches_every_cache() {
        let mut storage = CacheStorage::new();
        storage.open("rufingo-v1");
        storage
            .open("other")
            .put("https://example.com/x", entry("https://example.com/x", b"x"));

        assert_eq!(storage.match_request("https://example.com/x").unwrap().body, b"x");
        assert!(storage.match_request("https://example.com/y").is_none());
    }

    #[test]
    fn test_entry_response_roundtrip_keeps_repeated_headers() {
        let mut snapshot = entry("https://example.com/", b"body");
        snapshot.headers.push(("set-cookie".to_string(), b"a=1".to_vec()));
        snapshot.headers.push(("set-cookie".to_string(), b"b=2".to_vec()));

        let response = snapshot.to_response().unwrap();
        assert_eq!(response.headers.get_all("set-cookie").iter().count(), 2);

        let request = Request::get(Url::parse("https://example.com/").unwrap());
        let again = CacheEntry::from_response(&request, &response);
        assert_eq!(again.body, snapshot.body);
        assert_eq!(again.status, snapshot.status);
        assert_eq!(again.url, snapshot.url);
    }

    #[test]
    fn test_opaque_header_bytes_survive() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-disposition",
            HeaderValue::from_bytes(b"attachment; filename=\"caf\xe9.txt\"").unwrap(),
        );
        let url = Url::parse("https://example.com/export").unwrap();
        let response = Response::new(url.clone(), StatusCode::OK, headers, Bytes::new());

        let snapshot = CacheEntry::from_response(&Request::get(url), &response);
        let restored = snapshot.to_response().unwrap();

        assert_eq!(
            restored.headers.get("content-disposition").unwrap().as_bytes(),
            b"attachment; filename=\"caf\xe9.txt\""
        );
    }

    #[test]
    fn test_entry_with_bad_status_is_rejected() {
        let mut snapshot = entry("https://example.com/", b"");
        snapshot.status = 42;
        assert!(matches!(
            snapshot.to_response(),
            Err(ServiceWorkerError::CacheError(_))
        ));
    }

    #[test]
    fn test_persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("caches.json");

        let mut storage = CacheStorage::new();
        storage
            .open("rufingo-v1")
            .put("https://example.com/", entry("https://example.com/", b"<html>"));
        storage.set_active("rufingo-v1");
        storage.persist(&path).unwrap();

        let loaded = CacheStorage::load(&path).unwrap();
        assert_eq!(loaded.keys(), vec!["rufingo-v1"]);
        assert_eq!(loaded.active(), Some("rufingo-v1"));
        assert_eq!(
            loaded.match_request("https://example.com/"),
            storage.match_request("https://example.com/")
        );
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CacheStorage::load(&dir.path().join("absent.json")).unwrap();
        assert!(storage.keys().is_empty());
    }

    #[test]
    fn test_load_corrupt_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("caches.json");
        std::fs::write(&path, b"not json").unwrap();

        let err = CacheStorage::load(&path).unwrap_err();
        assert_eq!(err.category(), "json");
    }
}

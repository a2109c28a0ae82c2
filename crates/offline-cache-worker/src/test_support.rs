//! Test doubles shared by the worker and registration tests

use crate::error::{OfflineCacheError, Result};
use crate::network::Network;
use crate::storage::{CacheStorage, MemoryCacheStorage};
use crate::types::{cache_key, CacheStats, FetchRequest, FetchResponse};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Network that answers from a fixed route table and can be switched offline
#[derive(Default)]
pub struct ScriptedNetwork {
    routes: Mutex<HashMap<String, FetchResponse>>,
    failing: Mutex<HashSet<String>>,
    offline: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(self, url: &str, body: &str) -> Self {
        self.set_route(FetchResponse::new(url, 200).with_body(body));
        self
    }

    pub fn set_route(&self, response: FetchResponse) {
        self.routes
            .lock()
            .unwrap()
            .insert(cache_key(&response.url), response);
    }

    pub fn fail_url(&self, url: &str) {
        self.failing.lock().unwrap().insert(cache_key(url));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        self.calls.lock().unwrap().push(request.url.clone());

        let key = request.cache_key();
        if self.offline.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(&key) {
            return Err(OfflineCacheError::Network(format!(
                "connection refused: {}",
                request.url
            )));
        }

        let response = self.routes.lock().unwrap().get(&key).cloned();
        Ok(response.unwrap_or_else(|| FetchResponse::new(request.url.clone(), 404)))
    }
}

/// Memory storage whose deletes fail for selected generations
#[derive(Default)]
pub struct FlakyStorage {
    pub inner: MemoryCacheStorage,
    failing_deletes: HashSet<String>,
}

impl FlakyStorage {
    pub fn failing_deletes_for(names: &[&str]) -> Self {
        Self {
            inner: MemoryCacheStorage::new(),
            failing_deletes: names.iter().map(|n| n.to_string()).collect(),
        }
    }
}

#[async_trait]
impl CacheStorage for FlakyStorage {
    async fn open(&self, name: &str) -> Result<()> {
        self.inner.open(name).await
    }

    async fn put_all(&self, name: &str, entries: Vec<(String, FetchResponse)>) -> Result<()> {
        self.inner.put_all(name, entries).await
    }

    async fn match_in(&self, name: &str, key: &str) -> Result<Option<FetchResponse>> {
        self.inner.match_in(name, key).await
    }

    async fn match_any(&self, key: &str) -> Result<Option<FetchResponse>> {
        self.inner.match_any(key).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        if self.failing_deletes.contains(name) {
            return Err(OfflineCacheError::from(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("{} is locked", name),
            )));
        }
        self.inner.delete(name).await
    }

    async fn entry_keys(&self, name: &str) -> Result<Vec<String>> {
        self.inner.entry_keys(name).await
    }

    async fn stats(&self) -> CacheStats {
        self.inner.stats().await
    }
}
